//  INFO.rs
//    by Lut99
//
//  Created:
//    11 Mar 2024, 11:20:31
//  Last edited:
//    17 Jun 2024, 15:08:12
//  Auto updated?
//    Yes
//
//  Description:
//!   Defines the general [`Info`]-trait, which is used to abstract over
//!   the various types of disk-stored configuration files. The
//!   configure pipeline is a single synchronous pass, so all loading is
//!   blocking.
//

use std::error::Error;
use std::fmt::{Debug, Display, Formatter, Result as FResult};
use std::fs::File;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};


/***** ERRORS *****/
/// Defines general errors for configs.
#[derive(Debug)]
pub enum InfoError<E: Debug> {
    /// Failed to create the output file.
    OutputCreateError { path: PathBuf, err: std::io::Error },
    /// Failed to open the input file.
    InputOpenError { path: PathBuf, err: std::io::Error },

    /// Failed to serialize the config to a string.
    StringSerializeError { err: E },
    /// Failed to serialize the config to a given writer.
    WriterSerializeError { err: E },
    /// Failed to serialize the config to a given file.
    FileSerializeError { path: PathBuf, err: E },

    /// Failed to deserialize a string to the config.
    StringDeserializeError { err: E },
    /// Failed to deserialize a reader to the config.
    ReaderDeserializeError { err: E },
    /// Failed to deserialize a file to the config.
    FileDeserializeError { path: PathBuf, err: E },
}
impl<E: Error> Display for InfoError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> FResult {
        use InfoError::*;
        match self {
            OutputCreateError { path, .. } => write!(f, "Failed to create output file '{}'", path.display()),
            InputOpenError { path, .. } => write!(f, "Failed to open input file '{}'", path.display()),

            StringSerializeError { .. } => write!(f, "Failed to serialize to string"),
            WriterSerializeError { .. } => write!(f, "Failed to serialize to a writer"),
            FileSerializeError { path, .. } => write!(f, "Failed to serialize to output file '{}'", path.display()),

            StringDeserializeError { .. } => write!(f, "Failed to deserialize from string"),
            ReaderDeserializeError { .. } => write!(f, "Failed to deserialize from a reader"),
            FileDeserializeError { path, .. } => write!(f, "Failed to deserialize from input file '{}'", path.display()),
        }
    }
}
impl<E: 'static + Error> Error for InfoError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        use InfoError::*;
        match self {
            OutputCreateError { err, .. } => Some(err),
            InputOpenError { err, .. } => Some(err),

            StringSerializeError { err } => Some(err),
            WriterSerializeError { err } => Some(err),
            FileSerializeError { err, .. } => Some(err),

            StringDeserializeError { err } => Some(err),
            ReaderDeserializeError { err } => Some(err),
            FileDeserializeError { err, .. } => Some(err),
        }
    }
}





/***** LIBRARY *****/
/// Defines a serializable struct that we typically use for structs that are directly read and
/// written to disk.
pub trait Info: Clone + Debug {
    /// The types of errors that may be thrown by the serialization function(s).
    type Error: Error;


    // Child-provided
    /// Serializes this Info to a string.
    ///
    /// # Returns
    /// A new String that represents this info but serialized.
    ///
    /// # Errors
    /// This function may error if the serialization failed.
    fn to_string(&self) -> Result<String, InfoError<Self::Error>>;
    /// Serializes this Info to a writer.
    ///
    /// # Arguments
    /// - `writer`: The `Write`r to write the serialized representation to.
    ///
    /// # Errors
    /// This function may error if the serialization failed or if we failed to write to the given writer.
    fn to_writer(&self, writer: impl Write) -> Result<(), InfoError<Self::Error>>;

    /// Deserializes the given string to an instance of ourselves.
    ///
    /// # Arguments
    /// - `raw`: The raw string to deserialize.
    ///
    /// # Errors
    /// This function may fail if the input string was invalid for this object.
    fn from_string(raw: impl AsRef<str>) -> Result<Self, InfoError<Self::Error>>;
    /// Deserializes the contents of the given reader to an instance of ourselves.
    ///
    /// # Arguments
    /// - `reader`: The `Read`er who's contents to deserialize.
    ///
    /// # Errors
    /// This function may fail if we failed to read from the reader or if its contents were invalid for this object.
    fn from_reader(reader: impl Read) -> Result<Self, InfoError<Self::Error>>;


    // Globally deduced
    /// Serializes this Info to a file at the given path.
    ///
    /// # Arguments
    /// - `path`: The path where to write the file to.
    ///
    /// # Errors
    /// This function may error if the serialization failed or if we failed to create and/or write to the file.
    fn to_path(&self, path: impl AsRef<Path>) -> Result<(), InfoError<Self::Error>> {
        let path: &Path = path.as_ref();

        // Attempt to create the new file
        let handle: File = match File::create(path) {
            Ok(handle) => handle,
            Err(err) => {
                return Err(InfoError::OutputCreateError { path: path.into(), err });
            },
        };

        // Write it using the child function, wrapping the error that may occur
        match self.to_writer(handle) {
            Ok(_) => Ok(()),
            Err(InfoError::WriterSerializeError { err }) => Err(InfoError::FileSerializeError { path: path.into(), err }),
            Err(err) => Err(err),
        }
    }

    /// Deserializes this Info from the file at the given path.
    ///
    /// # Arguments
    /// - `path`: The path where to read the file from.
    ///
    /// # Errors
    /// This function may fail if we failed to open/read from the file or if its contents were invalid for this object.
    fn from_path(path: impl AsRef<Path>) -> Result<Self, InfoError<Self::Error>> {
        let path: &Path = path.as_ref();

        // Attempt to open the given file
        let handle: File = match File::open(path) {
            Ok(handle) => handle,
            Err(err) => {
                return Err(InfoError::InputOpenError { path: path.into(), err });
            },
        };

        // Read it using the child function, wrapping the error that may occur
        match Self::from_reader(handle) {
            Ok(config) => Ok(config),
            Err(InfoError::ReaderDeserializeError { err }) => Err(InfoError::FileDeserializeError { path: path.into(), err }),
            Err(err) => Err(err),
        }
    }
}



/// A marker trait that will let the compiler implement `Info` for this object using the
/// `serde_yaml` backend.
pub trait YamlInfo<'de>: Clone + Debug + Deserialize<'de> + Serialize {}
impl<T: DeserializeOwned + Serialize + for<'de> YamlInfo<'de>> Info for T {
    type Error = serde_yaml::Error;

    fn to_string(&self) -> Result<String, InfoError<Self::Error>> {
        match serde_yaml::to_string(self) {
            Ok(raw) => Ok(raw),
            Err(err) => Err(InfoError::StringSerializeError { err }),
        }
    }

    fn to_writer(&self, writer: impl Write) -> Result<(), InfoError<Self::Error>> {
        match serde_yaml::to_writer(writer, self) {
            Ok(raw) => Ok(raw),
            Err(err) => Err(InfoError::WriterSerializeError { err }),
        }
    }

    fn from_string(raw: impl AsRef<str>) -> Result<Self, InfoError<Self::Error>> {
        match serde_yaml::from_str(raw.as_ref()) {
            Ok(config) => Ok(config),
            Err(err) => Err(InfoError::StringDeserializeError { err }),
        }
    }

    fn from_reader(reader: impl Read) -> Result<Self, InfoError<Self::Error>> {
        match serde_yaml::from_reader(reader) {
            Ok(config) => Ok(config),
            Err(err) => Err(InfoError::ReaderDeserializeError { err }),
        }
    }
}

/// A type alias for the InfoError for YAML-backed Infos.
pub type YamlError = InfoError<serde_yaml::Error>;
