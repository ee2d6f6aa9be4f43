//! Integration test: URL resolution and claim search on an indexed chain.
//!
//! One block publishes a channel, a signed and an unsigned claim under the
//! same name, a second tagged stream and a repost. The tests then check:
//! 1. Bare names resolve to the controlling claim
//! 2. Claim id, amount-order and channel-scoped URLs pick the right claim
//! 3. Lookup and parse failures are reported per URL
//! 4. Facet filters, channel filters, paging and totals
//! 5. Referenced rows list signing channels before repost targets
//! 6. The async reader pool serves concurrent requests

use claimtrie_db::search::{Constraints, ResolveError};
use claimtrie_db::DbError;
use claimtrie_integration_tests::{channel, key, repost, stream, stream_with, TestChain, Txo};
use serde_json::{json, Map, Value};

struct Published {
    chain: TestChain,
    chan: Txo,
    signed: Txo,
    unsigned: Txo,
    song: Txo,
    share: Txo,
}

fn published() -> Published {
    let chan_key = key(9);
    let mut chain = TestChain::new(100);
    let chan = chain.create("@chan", 1, channel(&chan_key));
    let signed = chain.create_signed("video", 5, stream(), &chan, &chan_key);
    let unsigned = chain.create("video", 10, stream_with(&["music", "art"], &["en"]));
    let song = chain.create("song", 3, stream_with(&["music"], &["fr"]));
    let share = chain.create("share", 1, repost(&signed));
    chain.mine();
    Published {
        chain,
        chan,
        signed,
        unsigned,
        song,
        share,
    }
}

fn request(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("not a request object: {other}"),
    }
}

fn resolve_one(chain: &TestChain, url: &str) -> Result<[u8; 20], ResolveError> {
    chain
        .reader()
        .resolve_url(url)
        .expect("resolve")
        .map(|row| row.claim_hash)
}

#[test]
fn bare_name_resolves_to_controlling_claim() {
    let p = published();
    assert_eq!(resolve_one(&p.chain, "video"), Ok(p.unsigned.claim_hash));
    assert_eq!(resolve_one(&p.chain, "lbry://video"), Ok(p.unsigned.claim_hash));
    assert_eq!(resolve_one(&p.chain, "@chan"), Ok(p.chan.claim_hash));
}

#[test]
fn modifiers_select_specific_claims() {
    let p = published();
    let by_id = format!("video#{}", p.signed.claim_id());
    assert_eq!(resolve_one(&p.chain, &by_id), Ok(p.signed.claim_hash));
    assert_eq!(resolve_one(&p.chain, "video$1"), Ok(p.unsigned.claim_hash));
    assert_eq!(resolve_one(&p.chain, "video$2"), Ok(p.signed.claim_hash));
    assert!(matches!(
        resolve_one(&p.chain, "video$3"),
        Err(ResolveError::Lookup(_))
    ));
}

#[test]
fn channel_urls_resolve_within_the_channel() {
    let p = published();
    assert_eq!(resolve_one(&p.chain, "@chan/video"), Ok(p.signed.claim_hash));

    let channel_id = p.chan.claim_id();
    let by_id = format!("lbry://@chan#{}/video", &channel_id[..4]);
    assert_eq!(resolve_one(&p.chain, &by_id), Ok(p.signed.claim_hash));

    let by_short_url = format!("{}/video", p.chain.row(&p.chan).short_url);
    assert_eq!(resolve_one(&p.chain, &by_short_url), Ok(p.signed.claim_hash));
}

#[test]
fn failures_are_reported_per_url() {
    let p = published();
    let urls: Vec<String> = ["@missing/video", "@chan/nothing", "nothing", "foo#xyz", "video"]
        .iter()
        .map(|u| u.to_string())
        .collect();
    let outcome = p.chain.reader().resolve(&urls).expect("resolve");
    assert_eq!(outcome.results.len(), 5);

    let messages: Vec<String> = outcome.results[..3]
        .iter()
        .map(|r| r.as_ref().expect_err("lookup fails").to_string())
        .collect();
    assert_eq!(
        messages,
        vec![
            "Could not find channel in \"@missing/video\".".to_string(),
            "Could not find stream in \"@chan/nothing\".".to_string(),
            "Could not find stream in \"nothing\".".to_string(),
        ]
    );
    assert!(matches!(outcome.results[3], Err(ResolveError::Parse(_))));
    assert_eq!(
        outcome.results[4].as_ref().map(|row| row.claim_hash),
        Ok(p.unsigned.claim_hash)
    );
}

#[test]
fn resolve_lists_signing_channels_as_referenced() {
    let p = published();
    let urls = vec!["@chan/video".to_string(), "song".to_string()];
    let outcome = p.chain.reader().resolve(&urls).expect("resolve");
    let referenced: Vec<_> = outcome.referenced.iter().map(|r| r.claim_hash).collect();
    assert_eq!(referenced, vec![p.chan.claim_hash]);
}

#[test]
fn tag_and_language_filters() {
    let p = published();
    let reader = p.chain.reader();
    let hashes = |value: Value| -> Vec<[u8; 20]> {
        let mut found: Vec<_> = reader
            .search_json(&request(value))
            .expect("search")
            .rows
            .into_iter()
            .map(|row| row.claim_hash)
            .collect();
        found.sort();
        found
    };

    let mut music = vec![p.unsigned.claim_hash, p.song.claim_hash];
    music.sort();
    assert_eq!(hashes(json!({"any_tags": ["music"]})), music);
    assert_eq!(
        hashes(json!({"all_tags": ["music", "art"]})),
        vec![p.unsigned.claim_hash]
    );
    assert_eq!(
        hashes(json!({"any_tags": "music", "not_tags": "art"})),
        vec![p.song.claim_hash]
    );
    assert_eq!(hashes(json!({"any_languages": "fr"})), vec![p.song.claim_hash]);
    assert_eq!(
        hashes(json!({"claim_type": "channel"})),
        vec![p.chan.claim_hash]
    );
}

#[test]
fn channel_filter_returns_signed_claims_and_their_channel() {
    let p = published();
    let result = p
        .chain
        .reader()
        .search_json(&request(json!({"channel": "@chan"})))
        .expect("search");
    assert_eq!(result.total, Some(1));
    assert_eq!(result.rows[0].claim_hash, p.signed.claim_hash);
    assert_eq!(result.referenced.len(), 1);
    assert_eq!(result.referenced[0].claim_hash, p.chan.claim_hash);

    let missing = p
        .chain
        .reader()
        .search_json(&request(json!({"channel": "@nobody"})))
        .expect("search");
    assert!(missing.rows.is_empty());
    assert_eq!(missing.total, Some(0));
}

#[test]
fn repost_references_channel_before_target() {
    let p = published();
    let result = p
        .chain
        .reader()
        .search_json(&request(json!({"name": "share"})))
        .expect("search");
    assert_eq!(result.rows.len(), 1);
    assert_eq!(result.rows[0].claim_hash, p.share.claim_hash);
    let referenced: Vec<_> = result.referenced.iter().map(|r| r.claim_hash).collect();
    assert_eq!(referenced, vec![p.chan.claim_hash, p.signed.claim_hash]);
}

#[test]
fn paging_and_totals() {
    let p = published();
    let reader = p.chain.reader();

    let page = reader
        .search_json(&request(json!({"limit": 2, "offset": 1})))
        .expect("search");
    assert_eq!(page.total, Some(5));
    assert_eq!(page.rows.len(), 2);
    assert_eq!(page.offset, 1);

    let page = reader
        .search_json(&request(json!({"limit": 1, "no_totals": true})))
        .expect("search");
    assert_eq!(page.total, None);
    assert_eq!(page.rows.len(), 1);

    let page = reader
        .search_json(&request(json!({"limit": 1000})))
        .expect("search");
    assert_eq!(page.rows.len(), 5);

    let page = reader
        .search_json(&request(json!({"order_by": ["^effective_amount"], "limit": 1})))
        .expect("search");
    assert_eq!(page.rows[0].effective_amount, 1);
}

#[test]
fn invalid_requests_are_rejected() {
    let p = published();
    let reader = p.chain.reader();
    for bad in [
        json!({"colour": "blue"}),
        json!({"order_by": ["bogus"]}),
        json!({"limit": "many"}),
        json!({"claim_type": "poem"}),
    ] {
        assert!(
            matches!(reader.search_json(&request(bad.clone())), Err(DbError::InvalidQuery(_))),
            "{bad} should be rejected"
        );
    }
    assert!(matches!(
        reader.search_json(&request(json!({"channel": "@a/@b"}))),
        Err(DbError::Parse(_))
    ));
}

#[tokio::test]
async fn reader_pool_serves_concurrent_requests() {
    let p = published();
    let pool = p.chain.index.reader_pool();
    let (search, resolve) = tokio::join!(
        pool.search(Constraints {
            name: Some("video".into()),
            ..Default::default()
        }),
        pool.resolve(vec!["@chan/video".into(), "song".into()]),
    );

    assert_eq!(search.expect("search").total, Some(2));
    let outcome = resolve.expect("resolve");
    assert_eq!(
        outcome.results[0].as_ref().map(|row| row.claim_hash),
        Ok(p.signed.claim_hash)
    );
    assert_eq!(
        outcome.results[1].as_ref().map(|row| row.claim_hash),
        Ok(p.song.claim_hash)
    );
    assert!(pool.idle_count() >= 1);
}
