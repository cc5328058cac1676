pub mod dct;
pub mod stamp;

pub use dct::DctCodec;
pub use stamp::{StampConfig, TextStamp};
