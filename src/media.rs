//! Rewriting of locally served media paths into externally reachable URLs.

use tracing::{debug, info, warn};

use crate::constants::LOCAL_PATH_PREFIXES;
use crate::host::ExternalUrlResolver;

pub fn is_absolute_url(reference: &str) -> bool {
    reference.starts_with("http://") || reference.starts_with("https://")
}

/// The recognized local prefix `path` starts with, if any.
pub fn local_prefix(path: &str) -> Option<&'static str> {
    LOCAL_PATH_PREFIXES
        .iter()
        .copied()
        .find(|prefix| path.starts_with(prefix))
}

/// Concatenate a base URL and an absolute path without doubling the slash.
pub fn join_base(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Turn a media reference into something the provider can fetch.
///
/// Absolute URLs and unrecognized paths come back untouched. Local paths are
/// joined to `own_external_url` when set, otherwise to the host's external
/// address; if that cannot be resolved the path is returned unchanged.
pub fn rewrite_media_reference(
    reference: &str,
    own_external_url: Option<&str>,
    resolver: &dyn ExternalUrlResolver,
    verbose: bool,
) -> String {
    if is_absolute_url(reference) || local_prefix(reference).is_none() {
        return reference.to_string();
    }

    let base = match own_external_url.filter(|url| !url.is_empty()) {
        Some(url) => url.to_string(),
        None => match resolver.external_url() {
            Ok(url) => url,
            Err(e) => {
                warn!(
                    path = reference,
                    "Could not get external URL for local path: {}. \
                     Configure an external URL in the integration settings.",
                    e
                );
                return reference.to_string();
            }
        },
    };

    let full_url = join_base(&base, reference);
    if verbose {
        info!("Converted {} to {}", reference, full_url);
    } else {
        debug!("Converted {} to {}", reference, full_url);
    }
    full_url
}
