//! Automation backends behind [`SurfaceFactory`].

#[cfg(feature = "chromium")]
pub mod chromium;

use anyhow::Result;
use std::sync::Arc;

use crate::sensing::SurfaceFactory;

/// The compiled-in browser backend.
#[cfg(feature = "chromium")]
pub async fn open_backend(headful: bool) -> Result<Arc<dyn SurfaceFactory>> {
    let factory = chromium::ChromiumFactory::launch(headful).await?;
    Ok(Arc::new(factory))
}

#[cfg(not(feature = "chromium"))]
pub async fn open_backend(_headful: bool) -> Result<Arc<dyn SurfaceFactory>> {
    anyhow::bail!("no browser backend compiled in (build with --features chromium)")
}
