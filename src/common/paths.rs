//! URL path building.

use snafu::ResultExt;
use url::Url;

use crate::{error::InvalidUrlSnafu, Result};

/// Parses a configured base URL.
pub(crate) fn parse_base(base: &str) -> Result<Url> {
    Url::parse(base).context(InvalidUrlSnafu { url: base })
}

/// Appends path segments to `base`, percent-encoding each one.
///
/// A trailing slash on `base` is ignored, so `https://host/` and `https://host`
/// produce the same result. A segment containing `/` stays a single segment.
pub(crate) fn join_segments<I, S>(base: &Url, segments: I) -> Result<Url>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut url = base.clone();
    match url.path_segments_mut() {
        Ok(mut path) => {
            path.pop_if_empty().extend(segments);
        }
        Err(()) => {
            return Err(url::ParseError::RelativeUrlWithCannotBeABaseBase)
                .context(InvalidUrlSnafu { url: base.as_str() });
        }
    }
    Ok(url)
}
