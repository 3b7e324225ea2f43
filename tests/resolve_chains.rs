mod support;

use std::time::Duration;

use novelwatch::resolver::AttemptOutcome;
use novelwatch::sites::{
    ArchiveSite, MirrorRule, RssSite, SiteEntry, SiteFamily, SiteRegistry, StaticListSite,
};

use support::{
    CHALLENGE_PAGE, StubSite, fetcher_with_timeouts, resolver, resolver_with_fetcher, route, rss,
    slow_route,
};

fn chapter_list(n: usize) -> String {
    let items = (1..=n)
        .map(|i| format!("<li><a href=\"/b/book/chapter-{i}\">Chapter {i}</a></li>"))
        .collect::<String>();
    format!("<ul class=\"list-chapter\">{items}</ul>")
}

fn rss_site(ceiling: u32, mirror: Option<MirrorRule>) -> RssSite {
    RssSite {
        ceiling,
        mirror,
        ..RssSite::scribblehub()
    }
}

#[tokio::test]
async fn archive_probe_counts_hidden_archive_entries() {
    let site = StubSite::spawn(vec![
        route(
            "/b/book",
            200,
            r#"<html><body><div id="rating" data-novel-id="book-id"></div></body></html>"#,
        ),
        route("/ajax/chapter-archive?novelId=book-id", 200, &chapter_list(20)),
    ]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::archive(&site.host, ArchiveSite::novelbin())]),
        Vec::new(),
    );

    let result = resolver.resolve(&site.url("/b/book")).await;
    assert_eq!(result.count, 20);
    assert_eq!(result.method.as_deref(), Some("archive-probe"));

    let hits = site.hits();
    assert_eq!(hits.len(), 2);
    assert_eq!(hits[1].target, "/ajax/chapter-archive?novelId=book-id");
}

#[tokio::test]
async fn archive_family_falls_back_to_label_using_cached_page() {
    let site = StubSite::spawn(vec![route(
        "/b/book",
        200,
        r#"<html><body>
             <div class="l-chapter"><a class="chapter-title" href="/b/book/c">Chapter 88: The End</a></div>
           </body></html>"#,
    )]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::archive(&site.host, ArchiveSite::novelbin())]),
        Vec::new(),
    );

    let result = resolver.resolve(&site.url("/b/book")).await;
    assert_eq!(result.count, 88);
    assert_eq!(result.method.as_deref(), Some("latest-chapter-label"));
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Empty);
    assert_eq!(site.hit_count(), 1);
}

#[tokio::test]
async fn archive_family_ends_with_visible_list() {
    let site = StubSite::spawn(vec![route(
        "/b/book",
        200,
        &format!("<html><body>{}</body></html>", chapter_list(3)),
    )]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::archive(&site.host, ArchiveSite::novelbin())]),
        Vec::new(),
    );

    let result = resolver.resolve(&site.url("/b/book")).await;
    assert_eq!(result.count, 3);
    assert_eq!(result.method.as_deref(), Some("visible-list"));
}

#[tokio::test]
async fn rss_feed_takes_largest_number_below_ceiling() {
    let site = StubSite::spawn(vec![route(
        "/rssfeed.php",
        200,
        &rss(&["Chapter 12", "Chapter 145: Finale", "Published 2024"]),
    )]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::rss(&site.host, rss_site(1000, None)).unwrap()]),
        Vec::new(),
    );

    let result = resolver.resolve(&site.url("/series/42/book")).await;
    assert_eq!(result.count, 145);
    assert_eq!(result.method.as_deref(), Some("rss-feed"));
    assert_eq!(site.hits()[0].target, "/rssfeed.php?type=series&sid=42");
}

#[tokio::test]
async fn blocked_feed_escalates_through_relays_in_order() {
    let site = StubSite::spawn(vec![route("/rssfeed.php", 403, CHALLENGE_PAGE)]);
    let relay = StubSite::spawn(vec![
        route("/dead", 502, "bad gateway"),
        route("/raw", 200, &rss(&["Chapter 12", "Chapter 145"])),
    ]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::rss(&site.host, rss_site(10_000, None)).unwrap()]),
        vec![relay.url("/dead?u={url}"), relay.url("/raw?url={url}")],
    );

    let result = resolver.resolve(&site.url("/series/42/book")).await;
    assert_eq!(result.count, 145);
    assert_eq!(result.method.as_deref(), Some("rss-feed"));

    let steps = result
        .attempts
        .iter()
        .map(|a| (a.strategy.as_str(), matches!(a.outcome, AttemptOutcome::Failed { .. })))
        .collect::<Vec<_>>();
    assert_eq!(
        steps,
        vec![
            ("rss-feed/direct", true),
            ("rss-feed/relay#1", true),
            ("rss-feed/relay#2", false),
            ("rss-feed", false),
        ]
    );

    let feed_url = site.url("/rssfeed.php?type=series&sid=42");
    let relay_hits = relay.hits();
    assert_eq!(relay_hits.len(), 2);
    assert_eq!(relay_hits[1].target, format!("/raw?url={feed_url}"));
}

#[tokio::test]
async fn feed_quoting_challenge_wording_is_read_directly() {
    let site = StubSite::spawn(vec![route(
        "/rssfeed.php",
        200,
        &rss(&["Chapter 12", "Chapter 13: Just a moment..."]),
    )]);
    let relay = StubSite::spawn(vec![route("/raw", 200, &rss(&["Chapter 999"]))]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::rss(&site.host, rss_site(10_000, None)).unwrap()]),
        vec![relay.url("/raw?url={url}")],
    );

    let result = resolver.resolve(&site.url("/series/42/book")).await;
    assert_eq!(result.count, 13);
    assert_eq!(result.method.as_deref(), Some("rss-feed"));
    assert_eq!(result.attempts[0].strategy, "rss-feed/direct");
    assert_eq!(result.attempts[0].outcome, AttemptOutcome::Succeeded);
    assert_eq!(relay.hit_count(), 0);
}

#[tokio::test]
async fn timed_out_feed_escalates_to_relay() {
    let site = StubSite::spawn(vec![slow_route(
        "/rssfeed.php",
        Duration::from_millis(1500),
        200,
        &rss(&["Chapter 1"]),
    )]);
    let relay = StubSite::spawn(vec![route("/raw", 200, &rss(&["Chapter 12", "Chapter 145"]))]);
    let resolver = resolver_with_fetcher(
        fetcher_with_timeouts(Duration::from_secs(5), Duration::from_millis(300)),
        SiteRegistry::new(vec![SiteEntry::rss(&site.host, rss_site(10_000, None)).unwrap()]),
        vec![relay.url("/raw?url={url}")],
    );

    let result = resolver.resolve(&site.url("/series/42/book")).await;
    assert_eq!(result.count, 145);
    assert_eq!(result.method.as_deref(), Some("rss-feed"));

    let direct = &result.attempts[0];
    assert_eq!(direct.strategy, "rss-feed/direct");
    match &direct.outcome {
        AttemptOutcome::Failed { reason } => {
            assert!(reason.starts_with("timed out after"), "{reason}")
        }
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(result.attempts[1].strategy, "rss-feed/relay#1");
    assert_eq!(result.attempts[1].outcome, AttemptOutcome::Succeeded);
}

#[tokio::test]
async fn timed_out_archive_endpoint_falls_back_to_label() {
    let site = StubSite::spawn(vec![
        route(
            "/b/book",
            200,
            r#"<html><body>
                 <div id="rating" data-novel-id="book-id"></div>
                 <div class="l-chapter"><a class="chapter-title" href="/b/book/c">Chapter 88</a></div>
               </body></html>"#,
        ),
        slow_route(
            "/ajax/chapter-archive?novelId=book-id",
            Duration::from_millis(1500),
            200,
            &chapter_list(20),
        ),
    ]);
    let resolver = resolver_with_fetcher(
        fetcher_with_timeouts(Duration::from_secs(5), Duration::from_millis(300)),
        SiteRegistry::new(vec![SiteEntry::archive(&site.host, ArchiveSite::novelbin())]),
        Vec::new(),
    );

    let result = resolver.resolve(&site.url("/b/book")).await;
    assert_eq!(result.count, 88);
    assert_eq!(result.method.as_deref(), Some("latest-chapter-label"));
    match &result.attempts[0].outcome {
        AttemptOutcome::Failed { reason } => assert!(reason.contains("timed out after"), "{reason}"),
        other => panic!("expected a timeout, got {other:?}"),
    }
    assert_eq!(site.hit_count(), 2);
}

#[tokio::test]
async fn unavailable_feed_resolves_through_mirror_site() {
    let mirror = StubSite::spawn(vec![route(
        "/b/the-book",
        200,
        r#"<div class="l-chapter"><a class="chapter-title">Chapter 300</a></div>"#,
    )]);
    let source = StubSite::spawn(vec![route("/rssfeed.php", 500, "oops")]);
    let rule = MirrorRule {
        slug_pattern: r"/series/\d+/([^/?#]+)".to_owned(),
        template: mirror.url("/b/{slug}"),
    };
    let resolver = resolver(
        SiteRegistry::new(vec![
            SiteEntry::rss(&source.host, rss_site(10_000, Some(rule))).unwrap(),
            SiteEntry::archive(&mirror.host, ArchiveSite::novelbin()),
        ]),
        Vec::new(),
    );

    let result = resolver.resolve(&source.url("/series/42/the-book")).await;
    assert_eq!(result.count, 300);
    assert_eq!(result.method.as_deref(), Some("mirror-lookup"));
    assert!(result.attempts.iter().any(|a| a.depth == 1
        && a.family == Some(SiteFamily::Archive)
        && a.outcome == AttemptOutcome::Resolved { count: 300 }));
    assert_eq!(mirror.hit_count(), 1);
}

#[tokio::test]
async fn mirror_lookups_do_not_recurse_past_one_level() {
    let a = StubSite::spawn(vec![route("/rssfeed.php", 404, "gone")]);
    let b = StubSite::spawn(vec![route("/rssfeed.php", 404, "gone")]);
    let to = |site: &StubSite, id: u32| MirrorRule {
        slug_pattern: r"/series/\d+/([^/?#]+)".to_owned(),
        template: site.url(&format!("/series/{id}/{{slug}}")),
    };
    let resolver = resolver(
        SiteRegistry::new(vec![
            SiteEntry::rss(&a.host, rss_site(10_000, Some(to(&b, 2)))).unwrap(),
            SiteEntry::rss(&b.host, rss_site(10_000, Some(to(&a, 1)))).unwrap(),
        ]),
        Vec::new(),
    );

    let result = resolver.resolve(&a.url("/series/1/book")).await;
    assert_eq!(result.count, 0);
    // feed + badge page on each side, once
    assert_eq!(a.hit_count(), 2);
    assert_eq!(b.hit_count(), 2);
}

#[tokio::test]
async fn count_badge_is_the_last_resort() {
    let site = StubSite::spawn(vec![
        route("/rssfeed.php", 404, "gone"),
        route(
            "/series/42/book",
            200,
            r#"<html><body><span class="cnt_chapter">(1,234)</span></body></html>"#,
        ),
    ]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::rss(&site.host, rss_site(10_000, None)).unwrap()]),
        Vec::new(),
    );

    let result = resolver.resolve(&site.url("/series/42/book")).await;
    assert_eq!(result.count, 1234);
    assert_eq!(result.method.as_deref(), Some("count-badge"));
}

#[tokio::test]
async fn static_list_reads_latest_chapter_label() {
    let site = StubSite::spawn(vec![route(
        "/novel/book.html",
        200,
        r#"<div class="m-newest1"><a class="con" href="/c">Chapter 57 - Homecoming</a></div>"#,
    )]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::static_list(
            &site.host,
            StaticListSite::freewebnovel(),
        )]),
        Vec::new(),
    );

    let result = resolver.resolve(&site.url("/novel/book.html")).await;
    assert_eq!(result.count, 57);
    assert_eq!(result.method.as_deref(), Some("latest-chapter-label"));
}

#[tokio::test]
async fn exhausted_chain_resolves_to_zero_with_attempt_trail() {
    let site = StubSite::spawn(vec![route("/b/book", 200, "<html><body>nothing</body></html>")]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::archive(&site.host, ArchiveSite::novelbin())]),
        Vec::new(),
    );

    let result = resolver.resolve(&site.url("/b/book")).await;
    assert!(!result.is_resolved());
    assert_eq!(result.method, None);
    assert_eq!(result.attempts.len(), 3);
}

#[tokio::test]
async fn unmatched_host_makes_no_request() {
    let known = StubSite::spawn(Vec::new());
    let unknown = StubSite::spawn(vec![route("/b/book", 200, &chapter_list(5))]);
    let resolver = resolver(
        SiteRegistry::new(vec![SiteEntry::archive(&known.host, ArchiveSite::novelbin())]),
        Vec::new(),
    );

    let result = resolver.resolve(&unknown.url("/b/book")).await;
    assert_eq!(result.count, 0);
    assert!(result.attempts.is_empty());
    assert_eq!(unknown.hit_count(), 0);
    assert_eq!(known.hit_count(), 0);
}
