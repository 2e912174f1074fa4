pub use build::*;
pub use ci::*;
pub use push::*;

mod build;
mod ci;
mod push;
