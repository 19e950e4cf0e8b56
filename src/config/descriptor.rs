//! `[descriptor]` section configuration.

use super::defaults;
use crate::descriptor::OutputMode;
use educe::Educe;
use serde::Deserialize;
use std::path::PathBuf;

/// `[descriptor]` section in jspc.toml - servlet mapping output.
///
/// # Example
/// ```toml
/// [descriptor]
/// mode = "merge"       # include | fragment | full | merge
/// encoding = "ISO-8859-1"
/// ```
#[derive(Debug, Clone, Educe, Deserialize)]
#[educe(Default)]
#[serde(deny_unknown_fields)]
pub struct DescriptorConfig {
    /// No descriptor is written when unset.
    #[serde(default)]
    pub mode: Option<OutputMode>,

    /// Destination file. Optional for `merge` only.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "defaults::descriptor::encoding")]
    #[educe(Default = defaults::descriptor::encoding())]
    pub encoding: String,
}
