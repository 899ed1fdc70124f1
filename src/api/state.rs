//! API shared state

use std::sync::Arc;

use crate::auth::AuthService;
use crate::catalog::CatalogService;
use crate::report::ReportService;
use crate::sheet::SheetCodec;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    pub auth: AuthService,
    pub catalog: CatalogService,
    pub reports: ReportService,
    /// Workbook codec for import/export (external collaborator).
    pub sheets: Arc<dyn SheetCodec>,
}

impl ApiState {
    pub fn new(
        auth: AuthService,
        catalog: CatalogService,
        reports: ReportService,
        sheets: Arc<dyn SheetCodec>,
    ) -> Self {
        Self {
            auth,
            catalog,
            reports,
            sheets,
        }
    }
}
