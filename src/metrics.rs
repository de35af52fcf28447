use crate::registry::ResourceCounts;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub render_ms: f64,
    /// Draw calls that wrote operators.
    pub draw_count: usize,
    /// Draw calls with nothing to paint.
    pub skipped_count: usize,
    pub raster_fallbacks: usize,
    pub text_runs: usize,
    pub images: usize,
    pub content_bytes: usize,
    /// Entries in the page's resource dictionary.
    pub resource_refs: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentMetrics {
    pub pages: Vec<PageMetrics>,
    pub total_render_ms: f64,
    pub total_bytes: usize,
    pub resources: ResourceCounts,
}

impl DocumentMetrics {
    pub(crate) fn push_page(&mut self, page: PageMetrics) {
        self.total_render_ms += page.render_ms;
        self.pages.push(page);
    }

    pub fn raster_fallbacks(&self) -> usize {
        self.pages.iter().map(|p| p.raster_fallbacks).sum()
    }

    pub fn content_bytes(&self) -> usize {
        self.pages.iter().map(|p| p.content_bytes).sum()
    }
}
