use std::fmt;

/// Possible errors returned when constructing or configuring a tree.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum PhTreeError {
    /// The number of dimensions requested is zero or exceeds the supported
    /// maximum of 6.
    InvalidDimensions { requested: usize },
    /// A box-intersect query was built over an odd number of dimensions,
    /// so its coordinates cannot be split into a lower half and an upper
    /// half of equal size.
    BoxDimensionMismatch { point_dimensions: usize },
}

impl std::error::Error for PhTreeError {}

impl fmt::Display for PhTreeError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            PhTreeError::InvalidDimensions { requested } => write!(
                f,
                "Error: {requested} is not a supported dimension count; \
                 PH-trees support 1 through 6 dimensions."
            ),
            PhTreeError::BoxDimensionMismatch { point_dimensions } => write!(
                f,
                "Error: a box point of {point_dimensions} dimensions cannot \
                 be split into two equal halves."
            ),
        }
    }
}

pub type PhTreeResult<T> = Result<T, PhTreeError>;
