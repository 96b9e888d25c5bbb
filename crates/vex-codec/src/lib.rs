//! vex-codec - Stable binary serialization of the VCL AST.
//!
//! Parsed modules are cached as a stream of TLV records:
//! `tag:u8 · length:uvarint · payload`. One tag exists per node variant
//! (see [`Tag`]); payload fields follow the AST's declaration order. The
//! format is append-only: decoders skip unknown tags by length, so old
//! readers tolerate newer writers.
//!
//! The encoder draws nested scratch buffers from a thread-local pool to
//! avoid allocator churn on deep trees; buffers are reset on reuse and
//! never escape the encoder.
//!
//! Round-trip is identity on structure: `decode(encode(x))` yields an AST
//! whose canonical rendering equals `x`'s. Source spans are not encoded.

mod decode;
mod encode;
mod tag;

pub use decode::Decoder;
pub use encode::Encoder;
pub use tag::Tag;

use thiserror::Error;

/// Decoding failure.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The byte stream ended inside a record.
    #[error("unexpected end of encoded stream")]
    UnexpectedEof,
    /// A record length overflows the remaining buffer.
    #[error("record length {length} exceeds remaining {remaining} bytes")]
    LengthOverflow { length: usize, remaining: usize },
    /// A varint ran past its maximum width.
    #[error("malformed varint length")]
    MalformedVarint,
    /// A tag appeared where a specific record kind was required.
    #[error("unexpected record tag {found:#04x}, expected {expected}")]
    UnexpectedTag { found: u8, expected: &'static str },
    /// A fixed-width payload had the wrong size.
    #[error("malformed {kind} payload of {len} bytes")]
    MalformedPayload { kind: &'static str, len: usize },
    /// Payload bytes were not valid UTF-8.
    #[error("invalid utf-8 in string payload")]
    InvalidUtf8,
}

#[cfg(test)]
mod tests {
    use super::*;
    use vex_util::{FileId, Handler};

    fn round_trip(src: &str) -> (String, String) {
        let handler = Handler::new();
        let decls = vex_par::parse(src, FileId(0), &handler);
        assert!(!handler.has_errors(), "parse failed: {:?}", handler.diagnostics());

        let encoded = Encoder::new().encode_module(&decls);
        let decoded = Decoder::new(&encoded).decode_module().expect("decode");

        let before: Vec<String> = decls.iter().map(|d| d.to_string()).collect();
        let after: Vec<String> = decoded.iter().map(|d| d.to_string()).collect();
        (before.join("\n"), after.join("\n"))
    }

    #[test]
    fn test_round_trip_declarations() {
        let (before, after) = round_trip(
            r#"
            acl internal { "10.0.0.0"/8; ! "192.168.0.1"; }
            backend origin {
              .host = "example.com";
              .connect_timeout = 1s;
              .probe = { .request = "GET /"; }
            }
            director edge random { .quorum = 50%; { .backend = origin; .weight = 1; } }
            table redirects STRING { "/a": "/b", "/c": "/d", }
            penaltybox banned {}
            ratecounter counts {}
            import std;
            include "extra";
            "#,
        );
        assert_eq!(before, after);
    }

    #[test]
    fn test_round_trip_statements() {
        let (before, after) = round_trip(
            r#"
            sub vcl_recv {
              declare local var.who STRING;
              set req.http.X = "a" req.http.B;
              add resp.http.Set-Cookie = "k=v";
              unset req.http.Drop;
              remove req.http.Gone;
              call normalize;
              if (req.url ~ "^/api") { error 404 "no"; } elsif (req.url ~ "^/x") { esi; } else { restart; }
              switch (req.http.Host) { case "a": break; case ~ "^b": fallthrough; default: break; }
              log "served " req.url;
              synthetic {"<body>"};
              synthetic.base64 "YWJj";
              goto done;
              done:
              header.filter(req, "X-Debug");
              return(lookup);
            }
            "#,
        );
        assert_eq!(before, after);
    }

    #[test]
    fn test_round_trip_spec_example() {
        // `set req.http.X = 1 + 2;` must decode with operator "=" and an
        // infix `+` of two integer literals.
        let handler = Handler::new();
        let decls = vex_par::parse("sub s { set req.http.X = 1 + 2; }", FileId(0), &handler);
        let encoded = Encoder::new().encode_module(&decls);
        let decoded = Decoder::new(&encoded).decode_module().expect("decode");

        use vex_par::ast::{Declaration, Expr, Statement};
        let Declaration::Subroutine(sub) = &decoded[0] else { panic!() };
        let Statement::Set(set) = &sub.block.statements[0] else { panic!() };
        assert_eq!(set.operator, "=");
        let Expr::Infix(infix) = &set.value else { panic!() };
        assert_eq!(infix.operator, "+");
        assert!(matches!(*infix.left, Expr::Int(_)));
        assert!(matches!(*infix.right, Expr::Int(_)));
    }

    #[test]
    fn test_return_parenthesis_flag_survives() {
        let (before, after) = round_trip("sub a { return lookup; }\nsub b { return(lookup); }");
        assert_eq!(before, after);
        assert!(after.contains("return lookup;"));
        assert!(after.contains("return(lookup);"));
    }

    #[test]
    fn test_unknown_tag_is_skipped_in_lists() {
        let handler = Handler::new();
        let decls = vex_par::parse("sub s { restart; }", FileId(0), &handler);
        let mut encoded = Encoder::new().encode_module(&decls);
        // Append a record with an unassigned tag; a newer writer could
        // emit this and the decoder must step over it.
        encoded.extend_from_slice(&[0xFE, 0x02, 0xAA, 0xBB]);
        let decoded = Decoder::new(&encoded).decode_module().expect("decode");
        assert_eq!(decoded.len(), 1);
    }

    #[test]
    fn test_truncated_stream_errors() {
        let handler = Handler::new();
        let decls = vex_par::parse("sub s { restart; }", FileId(0), &handler);
        let encoded = Encoder::new().encode_module(&decls);
        let err = Decoder::new(&encoded[..encoded.len() - 1])
            .decode_module()
            .unwrap_err();
        assert!(matches!(
            err,
            CodecError::LengthOverflow { .. } | CodecError::UnexpectedEof
        ));
    }
}
