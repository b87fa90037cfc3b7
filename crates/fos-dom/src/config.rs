//! Document configuration

/// Document configuration options
#[derive(Debug, Clone)]
pub struct DocumentConfig {
    /// Document address, used as the base for relative URLs
    pub url: Option<String>,

    /// Fetch `<img src>` resources
    pub enable_images: bool,

    /// Fetch `<script src>` resources
    pub enable_scripts: bool,

    /// Thread name of the job drain worker
    pub job_worker_name: String,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            url: None,
            enable_images: true,
            enable_scripts: true,
            job_worker_name: "fos-dom-jobs".to_string(),
        }
    }
}

impl DocumentConfig {
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_images(mut self, enabled: bool) -> Self {
        self.enable_images = enabled;
        self
    }

    pub fn with_scripts(mut self, enabled: bool) -> Self {
        self.enable_scripts = enabled;
        self
    }

    pub fn with_job_worker_name(mut self, name: impl Into<String>) -> Self {
        self.job_worker_name = name.into();
        self
    }
}
