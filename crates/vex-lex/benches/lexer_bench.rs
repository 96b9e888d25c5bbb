//! Lexer throughput benchmark.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use vex_lex::Lexer;
use vex_util::{FileId, Handler};

const SAMPLE: &str = r#"
// routing for the www service
acl internal {
  "10.0.0.0"/8;
  ! "10.1.2.3";
}

backend origin_api {
  .host = "api.example.com";
  .port = "443";
  .connect_timeout = 1s;
}

sub vcl_recv {
  #FASTLY recv
  declare local var.segment STRING;
  set var.segment = req.url.path;
  if (req.http.Host ~ "^api\." && client.ip !~ internal) {
    set req.http.X-Api = "1";
    error 403 "forbidden";
  }
  return(lookup);
}
"#;

fn bench_lexer(c: &mut Criterion) {
    c.bench_function("lex_sample_config", |b| {
        b.iter(|| {
            let handler = Handler::new();
            let tokens = Lexer::new(black_box(SAMPLE), FileId(0), &handler).tokenize();
            black_box(tokens)
        })
    });
}

criterion_group!(benches, bench_lexer);
criterion_main!(benches);
