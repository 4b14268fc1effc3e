//! Segment Sanitizer
//!
//! Streamed model output is cut at arbitrary marker positions, so a segment
//! can end with a formatting delimiter left open. Downstream renderers reject
//! unbalanced formatting outright, which would drop the whole segment.

/// Formatting delimiters that must appear an even number of times per
/// segment.
const TRACKED_DELIMITERS: [char; 3] = ['*', '_', '`'];

/// Balance formatting delimiters in `text`.
///
/// For each tracked delimiter with an odd occurrence count, exactly the last
/// occurrence is removed. Pure and idempotent: a second pass finds every
/// count already even.
pub fn sanitize(text: &str) -> String {
    let mut out = text.to_string();
    for delimiter in TRACKED_DELIMITERS {
        let count = out.chars().filter(|c| *c == delimiter).count();
        if count % 2 == 1 {
            if let Some(idx) = out.rfind(delimiter) {
                out.remove(idx);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_input_untouched() {
        let text = "The *trend* is `up` and _strong_.";
        assert_eq!(sanitize(text), text);
    }

    #[test]
    fn test_unclosed_delimiter_removed() {
        assert_eq!(sanitize("watch *BTCUSDT closely"), "watch BTCUSDT closely");
        assert_eq!(sanitize("a `code span` and ` stray"), "a `code span` and  stray");
    }

    #[test]
    fn test_removes_last_occurrence_only() {
        // Three asterisks: the last one goes, the first pair survives.
        assert_eq!(sanitize("*bold* and *loose"), "*bold* and loose");
    }

    #[test]
    fn test_idempotent() {
        let inputs = [
            "",
            "plain text",
            "*a* _b_ `c`",
            "*a _b `c",
            "***",
            "__`*`__*",
            "mixed *one _two `three",
        ];
        for input in inputs {
            let once = sanitize(input);
            assert_eq!(sanitize(&once), once, "not idempotent for {input:?}");
        }
    }

    #[test]
    fn test_all_counts_even_after_sanitize() {
        let inputs = ["*a* *b", "_ _ _", "` `` `", "*_`", "text * with _ everything `"];
        for input in inputs {
            let out = sanitize(input);
            for delimiter in super::TRACKED_DELIMITERS {
                let count = out.chars().filter(|c| *c == delimiter).count();
                assert_eq!(count % 2, 0, "odd {delimiter:?} count in {out:?}");
            }
        }
    }
}
