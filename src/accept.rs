//! Accept-Encoding parsing, reduced to a gzip yes/no.

/// Parses an Accept-Encoding header and returns whether the client accepts
/// gzip.
///
/// The header value is expected to be comma-separated encodings with optional
/// quality values (e.g., "gzip, br;q=1.0, zstd;q=0.8"). An explicit `q=0`
/// refuses the encoding.
pub(crate) fn accepts_gzip(header: &str) -> bool {
    header.split(',').any(|part| {
        let (encoding, quality) = parse_encoding_with_quality(part.trim());
        matches!(encoding, "gzip" | "x-gzip") && quality > 0.0
    })
}

/// Parses an encoding entry like "gzip" or "gzip;q=0.8" into (encoding, quality).
fn parse_encoding_with_quality(s: &str) -> (&str, f32) {
    let mut parts = s.splitn(2, ';');
    let encoding = parts.next().unwrap_or("").trim();

    let quality = parts
        .next()
        .and_then(|q| {
            let q = q.trim();
            if q.starts_with("q=") || q.starts_with("Q=") {
                q[2..].parse::<f32>().ok()
            } else {
                None
            }
        })
        .unwrap_or(1.0);

    (encoding, quality)
}
