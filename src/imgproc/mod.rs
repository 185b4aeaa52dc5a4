//! Pixel-level building blocks for the whiteboard pipeline.

pub mod contour;
pub mod filter;
pub mod inpaint;
mod mask;
pub mod morph;
pub mod threshold;
pub mod warp;

pub use contour::{external_contours, Contour};
pub use filter::{bilateral_filter, to_gray};
pub use inpaint::inpaint_telea;
pub use mask::Mask;
pub use morph::{KernelShape, StructuringElement};
pub use warp::warp_perspective_rgb;
