pub mod error;
pub mod io;
pub mod traits;

pub use error::WireError;
pub use io::{WireReader, WireWriter};
pub use traits::{Decode, Encode};
