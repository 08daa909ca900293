//! # Utility Modules
//!
//! ## Components
//! - **Crypto**: NewCAMD key spreading and EDE2 triple-DES CBC
//! - **Md5crypt**: `$1$` password digests used at login
//! - **Logging**: Structured logging configuration

pub mod crypto;
pub mod logging;
pub mod md5crypt;
