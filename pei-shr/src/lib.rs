//  LIB.rs
//    by Lut99
//
//  Created:
//    11 Mar 2024, 10:02:11
//  Last edited:
//    17 Jun 2024, 14:55:30
//  Auto updated?
//    Yes
//
//  Description:
//!   The `pei-shr` crate defines common functions and other tools used
//!   throughout the PeiDocker toolkit. Everything in here is
//!   schema-agnostic; anything that knows about the shape of
//!   `user_config.yml` or `docker-compose.yml` lives in `pei-cfg`
//!   instead.
//

// Declare some modules
pub mod fs;
pub mod substitution;
