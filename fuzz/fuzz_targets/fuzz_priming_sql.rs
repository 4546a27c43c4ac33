#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use searchprime::query::build_priming_sql;
use searchprime::service::sql::parse_select;

#[derive(Debug, Arbitrary)]
struct Scopes {
    included: Vec<String>,
    excluded: Vec<String>,
}

fuzz_target!(|scopes: Scopes| {
    let sql = build_priming_sql(&scopes.included, &scopes.excluded);

    // Paths without quotes always produce a statement the engine accepts
    let quoted = scopes
        .included
        .iter()
        .chain(&scopes.excluded)
        .any(|p| p.contains('\''));
    if !quoted {
        assert!(parse_select(sql.as_str()).is_ok(), "rejected: {}", sql);
    }
});
