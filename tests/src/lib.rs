//! # Event Bus Test Suite
//!
//! Cross-crate scenarios that no single crate can test on its own.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── replication.rs  # core node → socket → data node
//!     ├── replay.rs       # capture to file, replay into storage writers
//!     └── supervision.rs  # fatal errors turned into one shutdown
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p bus-tests
//! cargo test -p bus-tests integration::replication::
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
