//! Core raster and geometry utilities for answer-sheet reading.
//!
//! This crate is small and purely geometric: gray images, sampling,
//! homographies, thresholds and connected components. It knows nothing
//! about templates, anchors or marks.

mod components;
mod homography;
mod image;
mod logger;
mod quality;
mod threshold;

pub use components::{label_components, ComponentStats, UnionFind};
pub use homography::{estimate_homography, homography_from_4pt, Homography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView, ImageError};
pub use quality::{assess_quality, PhotoQuality, QualityLevel};
pub use threshold::{
    adaptive_threshold_mean, histogram, otsu_from_histogram, otsu_threshold, threshold_mask,
    IntegralImage,
};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, init_tracing_with_level};

pub use logger::{init_with_level, parse_level};
