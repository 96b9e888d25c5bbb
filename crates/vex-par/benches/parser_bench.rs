//! Parser throughput benchmark.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vex_par::Parser;
use vex_util::{FileId, Handler};

const SAMPLE: &str = r#"
table redirects STRING {
  "/old": "/new",
  "/legacy": "/",
}

backend origin {
  .host = "example.com";
  .port = "443";
  .first_byte_timeout = 15s;
}

sub vcl_recv {
  #FASTLY recv
  declare local var.host STRING;
  set var.host = std.tolower(req.http.Host);
  if (req.url ~ "^/admin" && client.ip !~ internal) {
    error 403 "forbidden";
  } elsif (req.url ~ "^/static") {
    set req.http.X-Static = "1";
  } else {
    unset req.http.X-Static;
  }
  return(lookup);
}

sub vcl_deliver {
  #FASTLY deliver
  add resp.http.Via = "vex";
  return(deliver);
}
"#;

fn bench_parser(c: &mut Criterion) {
    c.bench_function("parse_sample_config", |b| {
        b.iter(|| {
            let handler = Handler::new();
            let decls = Parser::new(black_box(SAMPLE), FileId(0), &handler).parse_module();
            black_box(decls)
        })
    });
}

criterion_group!(benches, bench_parser);
criterion_main!(benches);
