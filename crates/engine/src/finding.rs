/// Support flags of a reported feature for the current browser target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeatureFlags {
    /// At least one target browser lacks the feature entirely.
    pub missing: bool,
    /// At least one target browser supports the feature only partially.
    pub partial: bool,
}

/// Source span reported by the engine. Lines and columns are 1-based.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourcePosition {
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
}

/// One use of a feature that is not fully supported by the browser target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureFinding {
    /// caniuse feature identifier, e.g. `css-gradients`
    pub feature_id: String,
    pub flags: FeatureFlags,
    /// Engine message, still carrying its `<input css N>:L:C:` prefix
    pub message: String,
    pub position: SourcePosition,
}
