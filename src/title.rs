use anyhow::Context as _;

use crate::cli::TitleArgs;
use crate::fetch::{Fetcher, RequestKind};
use crate::sites::markup;

/// Human-readable title for a series page. Never fails: any problem falls
/// back to the URL itself as the display value.
pub async fn resolve_title(fetcher: &Fetcher, url: &str) -> String {
    match fetcher.fetch(url, RequestKind::Page).await {
        Ok(page) => match title_from_html(&page.body) {
            Some(title) => title,
            None => {
                tracing::debug!(url, "page has no usable <title>");
                url.to_owned()
            }
        },
        Err(failure) => {
            tracing::debug!(url, %failure, "title fetch failed");
            url.to_owned()
        }
    }
}

pub fn title_from_html(html: &str) -> Option<String> {
    let raw = markup::first_text(html, &["title".to_owned()]).ok()??;
    let title = strip_branding(&raw);
    (!title.is_empty()).then_some(title)
}

/// Drops a trailing site-branding suffix: everything from the first `|`,
/// or from the first ` - ` (a hyphen with spaces on both sides, so hyphenated
/// words survive).
///
/// Only the spaced form of `-` is a separator; a bare `-` never cuts.
pub fn strip_branding(title: &str) -> String {
    let title = markup::collapse_whitespace(title);
    let cut = [title.find('|'), title.find(" - ")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(title.len());
    title[..cut].trim().to_owned()
}

/// `novelwatch title`: print the resolved title.
pub async fn run(args: TitleArgs) -> anyhow::Result<()> {
    let fetcher = Fetcher::new(args.fetch.to_config()).context("build fetcher")?;
    println!("{}", resolve_title(&fetcher, &args.url).await);
    Ok(())
}
