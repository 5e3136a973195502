use crate::error::{ParseErrorKind, Result, RtspError};

/// Upper bound on each parsed output field.
///
/// The parser refuses any method, URL segment, or CSeq value that would not
/// fit a fixed 100-byte parameter buffer, so untrusted input can never grow
/// an output unboundedly.
pub const MAX_PARAM_LEN: usize = 100;

/// A parsed RTSP request line plus its `CSeq` header (RFC 2326 §6).
///
/// The parser is deliberately permissive and line-oriented, matching what
/// deployed RTSP clients actually send. It extracts only what request
/// dispatch needs:
///
/// ```text
/// SETUP rtsp://host:8554/camera1/track2 RTSP/1.0\r\n
///       \________________/\______/\____/
///         skipped authority   |      |
///                url_pre_suffix      url_suffix
/// ```
///
/// Case sensitivity is uneven on purpose: the `rtsp://` scheme is matched
/// case-insensitively, while the `RTSP/` version tag and the `CSeq: `
/// header are matched case-sensitively. Changing either breaks interop
/// with long-deployed clients.
#[derive(Debug)]
pub struct ParsedRequest {
    /// RTSP method (OPTIONS, DESCRIBE, SETUP, ...), matched case-sensitively
    /// by the dispatcher.
    pub method: String,
    /// Path segment between the two final `/` separators (the stream name
    /// in SETUP). May be empty.
    pub url_pre_suffix: String,
    /// Path segment after the final `/` separator (the track id in SETUP).
    /// May be empty.
    pub url_suffix: String,
    /// The `CSeq` header value, echoed verbatim in the response.
    pub cseq: String,
}

impl ParsedRequest {
    /// Parse a complete request message.
    ///
    /// Total and bounded over arbitrary bytes: either returns a tuple whose
    /// fields all fit [`MAX_PARAM_LEN`], or fails. A failed parse is
    /// answered with `400 Bad Request` and the CSeq omitted, since it may
    /// never have been seen.
    pub fn parse(req: &[u8]) -> Result<Self> {
        let n = req.len();

        // Everything up to the first space is the method.
        let method_end = req
            .iter()
            .take(MAX_PARAM_LEN)
            .position(|&c| c == b' ')
            .ok_or(RtspError::Parse {
                kind: ParseErrorKind::MissingMethod,
            })?;
        let method = lossy(&req[..method_end]);

        // Skip the authority of an "rtsp://host[:port]" URL, if one follows.
        // `path_origin` ends up on the byte just before the path: the slash
        // that terminated the authority, or the space after the method.
        let mut path_origin = method_end;
        let mut j = method_end + 1;
        while j + 7 <= n {
            if req[j..j + 7].eq_ignore_ascii_case(b"rtsp://") {
                j += 7;
                while j < n && req[j] != b'/' && req[j] != b' ' {
                    j += 1;
                }
                path_origin = j;
                break;
            }
            j += 1;
        }

        // The path ends at the case-sensitive "RTSP/" version tag.
        let mut rtsp_pos = None;
        let mut k = path_origin + 1;
        while k + 5 <= n {
            if &req[k..k + 5] == b"RTSP/" {
                rtsp_pos = Some(k);
                break;
            }
            k += 1;
        }
        let rtsp_pos = rtsp_pos.ok_or(RtspError::Parse {
            kind: ParseErrorKind::MissingVersion,
        })?;

        // Back over the spaces separating the path from "RTSP/".
        let path_start = path_origin + 1;
        let mut path_end = rtsp_pos;
        while path_end > path_start && req[path_end - 1] == b' ' {
            path_end -= 1;
        }

        // Split at the final separator: after it is the suffix, and the
        // segment between the two final separators is the pre-suffix.
        let seg = &req[path_start..path_end];
        let (suffix_start, sep) = match seg.iter().rposition(|&c| c == b'/' || c == b' ') {
            Some(p) => (path_start + p + 1, path_start + p),
            None => (path_start, path_start),
        };
        let url_suffix = &req[suffix_start..path_end];
        if url_suffix.len() >= MAX_PARAM_LEN {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::FieldTooLong,
            });
        }

        let pre_region = &req[path_start..sep];
        let pre_start = match pre_region.iter().rposition(|&c| c == b'/' || c == b' ') {
            Some(p) => path_start + p + 1,
            None => path_start,
        };
        let url_pre_suffix = &req[pre_start..sep];
        if url_pre_suffix.len() >= MAX_PARAM_LEN {
            return Err(RtspError::Parse {
                kind: ParseErrorKind::FieldTooLong,
            });
        }

        // "CSeq: " is case-sensitive; its value runs to the end of the line.
        let mut cseq = None;
        let mut j = rtsp_pos + 5;
        while j + 6 <= n {
            if &req[j..j + 6] == b"CSeq: " {
                let value_start = j + 6;
                let mut end = value_start;
                while end < n && end - value_start < MAX_PARAM_LEN - 1 {
                    if req[end] == b'\r' || req[end] == b'\n' {
                        cseq = Some(lossy(&req[value_start..end]));
                        break;
                    }
                    end += 1;
                }
                break;
            }
            j += 1;
        }
        let cseq = cseq.ok_or(RtspError::Parse {
            kind: ParseErrorKind::MissingCSeq,
        })?;

        Ok(ParsedRequest {
            method,
            url_pre_suffix: lossy(url_pre_suffix),
            url_suffix: lossy(url_suffix),
            cseq,
        })
    }
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}
