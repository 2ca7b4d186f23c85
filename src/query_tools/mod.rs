use sqlformat::{FormatOptions, Indent, QueryParams};

// Centralized sqlformat options for `--pretty` output
pub fn default_sqlformat_options() -> FormatOptions<'static> {
    FormatOptions {
        joins_as_top_level: true,
        indent: Indent::Spaces(4),
        uppercase: Some(true),
        lines_between_queries: 1,
        inline: false,
        max_inline_block: 50,
        max_inline_arguments: Some(40),
        max_inline_top_level: Some(40),
        ..Default::default()
    }
}

/// Multi-line rendering of compiled SQL; identifiers and literals are unchanged.
pub fn pretty_sql(sql: &str) -> String {
    sqlformat::format(sql, &QueryParams::None, &default_sqlformat_options())
}
