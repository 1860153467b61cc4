//! Answer-sheet layout templates and coordinate resolution.
//!
//! - [`LayoutTemplate`]: validated, immutable option layout in page millimeters.
//! - [`PageFrame`]: four-corner frame with a bilinear relative mapping.
//! - [`CoordinateResolver`]: template + anchors to pixel [`Region`]s.

mod frame;
mod region;
mod resolver;
mod template;

pub use frame::PageFrame;
pub use region::{QuestionRegions, Region};
pub use resolver::{CoordinateResolver, DropReason, DroppedQuestion, ResolveError, Resolution};
pub use template::{
    FiducialLayout, LayoutTemplate, OptionLayout, PageSize, PositionUnits, QuestionLayout,
    RawLayoutTemplate, RawOption, RawQuestion, RowAnchorLayout, TemplateError, TemplateIssue,
};
