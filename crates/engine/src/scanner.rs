use crate::{FeatureFinding, ScanError, Syntax};
use std::future::Future;

/// Input of a single scan.
#[derive(Debug, Clone, Copy)]
pub struct ScanRequest<'a> {
    pub css: &'a str,
    /// `None` selects the default CSS grammar.
    pub syntax: Option<Syntax>,
    /// Resolved browserslist queries. Never empty.
    pub browsers: &'a [String],
    /// Feature identifiers to leave unreported.
    pub ignore: &'a [String],
}

/// A feature-usage scanner.
///
/// One call scans one stylesheet and returns every finding, in the order the
/// engine reported them.
pub trait FeatureScanner: Send + Sync {
    fn scan(
        &self,
        request: ScanRequest<'_>,
    ) -> impl Future<Output = Result<Vec<FeatureFinding>, ScanError>> + Send;
}
