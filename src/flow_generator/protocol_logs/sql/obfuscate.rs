use std::collections::hash_map::DefaultHasher;
use std::hash::Hasher;
use std::num::NonZeroUsize;

use lru::LruCache;

use super::tokenizer::{scan_token, TokenKind};

pub const FINGERPRINT_CACHE_SIZE: usize = 8192;

pub type FingerprintCache = LruCache<u64, String>;

pub fn new_cache() -> FingerprintCache {
    LruCache::new(NonZeroUsize::new(FINGERPRINT_CACHE_SIZE).unwrap())
}

/// Reduces a statement to its stable fingerprint: literals become `?`,
/// whitespace runs collapse to one space, the hostname is stripped from a
/// leading route comment, and `?, ` sequences fold so `IN (?, ?, ?)`
/// becomes `IN (?)`.
pub fn canonicalize(query: &[u8]) -> String {
    let mut out = String::with_capacity(query.len());
    let mut i = 0;
    while i < query.len() {
        let (len, kind) = scan_token(&query[i..]);
        match kind {
            TokenKind::Word | TokenKind::Other => {
                out.push_str(&String::from_utf8_lossy(&query[i..i + len]))
            }
            TokenKind::Number | TokenKind::Quote => out.push('?'),
            TokenKind::Whitespace => out.push(' '),
        }
        i += len;
    }

    let normalized = strip_route_host(&out);
    normalized.replace("?, ", "")
}

/// Canonicalization sits on the per-request path, so hot statements are
/// memoized by a hash of their raw bytes.
pub fn canonicalize_cached(cache: &mut FingerprintCache, query: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    hasher.write(query);
    let key = hasher.finish();
    if let Some(cached) = cache.get(&key) {
        return cached.clone();
    }
    let fingerprint = canonicalize(query);
    cache.put(key, fingerprint.clone());
    fingerprint
}

// A conventional route comment is injected right after the verb:
//   SELECT /* host:route */ ...
// Only the route part is useful as a label; the host varies per client.
fn strip_route_host(text: &str) -> String {
    let parts: Vec<&str> = text.splitn(5, ' ').collect();
    if parts.len() >= 5 && parts[1] == "/*" && parts[3] == "*/" {
        if let Some((_, route)) = parts[2].split_once(':') {
            return format!("{} /* {} */ {}", parts[0], route, parts[4]);
        }
    }
    text.to_string()
}
