//! Service implementations
//!
//! Each resource file is self-contained: a schema plus the calls that map
//! its attributes onto one service's REST API.

pub mod identitycenter;
pub mod obs;
