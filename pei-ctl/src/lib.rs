//  LIB.rs
//    by Lut99
//
//  Created:
//    12 Mar 2024, 10:40:18
//  Last edited:
//    02 Jul 2024, 15:12:30
//  Auto updated?
//    Yes
//
//  Description:
//!   The `pei-ctl` crate implements the operations behind the `peictl`
//!   executable: seeding new PeiDocker projects (`create`) and turning
//!   a project's `user_config.yml` into a `docker-compose.yml` plus
//!   generated lifecycle hook scripts (`configure`).
//

// Declare the modules
pub mod assets;
pub mod configure;
pub mod create;
pub mod errors;
pub mod keys;
pub mod resolve;
pub mod scripts;
pub mod spec;
pub mod synthesize;
pub mod writer;
