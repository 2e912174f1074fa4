//! Strategies for the work the plugin hands off. Build drivers
//! run the image build, push drivers upload saved images, and CI
//! drivers read the pipeline's environment. Commands only talk to
//! the traits so the orchestration can be exercised without an
//! executor or a registry.

pub use drone_driver::DroneDriver;
pub use kaniko_driver::KanikoDriver;
pub use oci_push_driver::{ImageTarball, OciPushDriver};
pub use traits::*;

mod drone_driver;
mod kaniko_driver;
mod oci_push_driver;
pub mod opts;
mod traits;
