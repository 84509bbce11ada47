//! Dataset access: tag vectors and on-demand image decoding.

mod images;
mod tags;

pub use images::ImageSource;
pub use tags::TagStore;
