// ABOUTME: Validated domain types shared by config, manifest, and deploy code.
// ABOUTME: Service names and versioned image names.

mod image_name;
mod service_name;

pub use image_name::{ImageName, Version};
pub use service_name::{ServiceName, ServiceNameError};
