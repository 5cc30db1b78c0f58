pub mod descriptor;
pub mod detector;
pub mod environment;
pub mod probe;
pub mod product;

pub use descriptor::IdeDescriptor;
pub use detector::Detector;
pub use environment::Environment;
pub use probe::PathProbe;
pub use product::{Family, Platform, Product};
