//! Well-known user folders usable as search scopes

use anyhow::{Context, Result};
use clap::ValueEnum;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KnownFolder {
    Home,
    Documents,
    Desktop,
    Downloads,
    Pictures,
    Music,
    Videos,
}

impl KnownFolder {
    pub fn name(&self) -> &'static str {
        match self {
            KnownFolder::Home => "home",
            KnownFolder::Documents => "documents",
            KnownFolder::Desktop => "desktop",
            KnownFolder::Downloads => "downloads",
            KnownFolder::Pictures => "pictures",
            KnownFolder::Music => "music",
            KnownFolder::Videos => "videos",
        }
    }
}

/// Current user's path for `folder`
pub fn resolve_known_folder(folder: KnownFolder) -> Result<PathBuf> {
    let path = match folder {
        KnownFolder::Home => dirs::home_dir(),
        KnownFolder::Documents => dirs::document_dir(),
        KnownFolder::Desktop => dirs::desktop_dir(),
        KnownFolder::Downloads => dirs::download_dir(),
        KnownFolder::Pictures => dirs::picture_dir(),
        KnownFolder::Music => dirs::audio_dir(),
        KnownFolder::Videos => dirs::video_dir(),
    };
    path.with_context(|| format!("Could not resolve the {} folder", folder.name()))
}
