use anyhow::Context as _;
use url::Url;

use crate::cli::NormalizeArgs;
use crate::sites::SiteRegistry;

/// Canonical series URL for `url`.
///
/// For sites with known sub-path markers (glossary, stats, single chapter
/// pages, ...) the path is cut at the first marker segment and query and
/// fragment are dropped. Anything else, including unparseable input and
/// hosts without markers, comes back untouched, so the function is
/// idempotent.
pub fn normalize(url: &str, registry: &SiteRegistry) -> String {
    let Some(entry) = registry.lookup(url) else {
        return url.to_owned();
    };
    if entry.markers.is_empty() {
        return url.to_owned();
    }
    let Ok(mut parsed) = Url::parse(url) else {
        return url.to_owned();
    };

    let segments = parsed.path().split('/').collect::<Vec<_>>();
    let cut = segments
        .iter()
        .enumerate()
        .skip(1)
        .find(|(_, segment)| entry.markers.iter().any(|marker| marker.matches(segment)))
        .map(|(index, _)| index);
    let Some(cut) = cut else {
        return url.to_owned();
    };

    let root = segments[..cut].join("/");
    parsed.set_path(&root);
    parsed.set_query(None);
    parsed.set_fragment(None);
    parsed.to_string()
}

/// `novelwatch normalize`: print the canonical URL.
pub fn run(args: NormalizeArgs) -> anyhow::Result<()> {
    let registry = SiteRegistry::with_defaults().context("build site registry")?;
    println!("{}", normalize(&args.url, &registry));
    Ok(())
}
