use crate::config::ReportLanguage;
use crate::models::{DigestEntry, DigestReport, FetchStatus, SourceUsed};

// ==============================================================================
// Labels
// ==============================================================================

struct Labels {
    title: &'static str,
    covering: &'static str,
    price: &'static str,
    range: &'static str,
    related_news: &'static str,
    source: &'static str,
    footer: &'static str,
}

fn labels(language: ReportLanguage) -> Labels {
    match language {
        ReportLanguage::En => Labels {
            title: "📈 Daily Stock Brief",
            covering: "Covering",
            price: "Price",
            range: "8-week range",
            related_news: "Related news",
            source: "Source",
            footer: "This brief is generated automatically for reference only and is not investment advice.",
        },
        ReportLanguage::Zh => Labels {
            title: "📈 每日股票简报",
            covering: "覆盖股票",
            price: "价格",
            range: "8周区间",
            related_news: "相关新闻",
            source: "来源",
            footer: "本简报由 AI 自动生成，仅供参考，不构成投资建议。",
        },
    }
}

fn source_label(entry: &DigestEntry) -> &'static str {
    match (entry.fetch_status, entry.source_used) {
        (FetchStatus::Failed, _) => "unavailable",
        (_, SourceUsed::Primary) => "primary",
        (_, SourceUsed::Fallback) => "fallback",
        (_, SourceUsed::None) => "none",
    }
}

// ==============================================================================
// HTML
// ==============================================================================

/// Escape text for safe inclusion in HTML element content and attribute values.
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn change_class(change_percent: Option<f64>) -> &'static str {
    match change_percent {
        Some(p) if p > 0.0 => "positive",
        Some(p) if p < 0.0 => "negative",
        _ => "neutral",
    }
}

fn format_change(change_percent: Option<f64>) -> String {
    match change_percent {
        Some(p) if p > 0.0 => format!("+{:.2}%", p),
        Some(p) => format!("{:.2}%", p),
        None => "N/A".to_string(),
    }
}

/// Replaces `**bold**` pairs in already-escaped text.
fn render_bold(escaped: &str) -> String {
    let mut out = String::with_capacity(escaped.len());
    let mut open = false;
    for (i, part) in escaped.split("**").enumerate() {
        if i > 0 {
            out.push_str(if open { "</strong>" } else { "<strong>" });
            open = !open;
        }
        out.push_str(part);
    }
    if open {
        out.push_str("</strong>");
    }
    out
}

/// Lines starting with `- `, `* ` or `N. ` become list items, the rest paragraphs.
fn summary_to_html(summary: &str) -> String {
    let mut lines = Vec::new();
    let mut in_list = false;

    for raw in summary.lines() {
        let line = raw.trim().trim_start_matches('#').trim();
        let list_item = line
            .strip_prefix("- ")
            .or_else(|| line.strip_prefix("* "))
            .or_else(|| {
                let digits = line.chars().take_while(|c| c.is_ascii_digit()).count();
                if digits > 0 {
                    line[digits..].strip_prefix(". ")
                } else {
                    None
                }
            });

        match list_item {
            Some(item) => {
                if !in_list {
                    lines.push("<ul>".to_string());
                    in_list = true;
                }
                lines.push(format!("<li>{}</li>", render_bold(&escape_html(item))));
            }
            None => {
                if in_list {
                    lines.push("</ul>".to_string());
                    in_list = false;
                }
                if !line.is_empty() {
                    lines.push(format!("<p>{}</p>", render_bold(&escape_html(line))));
                }
            }
        }
    }
    if in_list {
        lines.push("</ul>".to_string());
    }
    lines.join("\n")
}

fn entry_html(entry: &DigestEntry, labels: &Labels) -> String {
    let company = if entry.company_name != entry.symbol {
        format!(
            " <span class=\"company\">({})</span>",
            escape_html(&entry.company_name)
        )
    } else {
        String::new()
    };

    let price = match entry.current_price {
        Some(p) => format!("<div class=\"price\">{}: ${:.2}</div>", labels.price, p),
        None => String::new(),
    };

    let range = match (entry.week_8_low, entry.week_8_high) {
        (Some(low), Some(high)) => format!(
            "<div class=\"range\">{}: <span class=\"low\">${:.2}</span> - <span class=\"high\">${:.2}</span></div>",
            labels.range, low, high
        ),
        _ => String::new(),
    };

    let links = if entry.top_links.is_empty() {
        String::new()
    } else {
        let anchors: Vec<String> = entry
            .top_links
            .iter()
            .map(|url| {
                let url = escape_html(url);
                format!("<a href=\"{}\">{}</a>", url, url)
            })
            .collect();
        format!(
            "<div class=\"links\"><h4>{} ({})</h4>{}</div>",
            labels.related_news,
            entry.news_count,
            anchors.join("\n")
        )
    };

    format!(
        r#"<div class="card">
    <div class="card-header">
        <div class="symbol">{}{}</div>
        <div class="change {}">{}</div>
    </div>
    {}{}
    <div class="summary">
{}
    </div>
    {}
    <div class="meta">{}: {}</div>
</div>"#,
        escape_html(&entry.symbol),
        company,
        change_class(entry.price_change_percent),
        format_change(entry.price_change_percent),
        price,
        range,
        summary_to_html(&entry.summary_text),
        links,
        labels.source,
        source_label(entry),
    )
}

/// Renders the digest as a self-contained HTML document.
pub fn render_html(report: &DigestReport) -> String {
    let labels = labels(report.language);
    let symbols: Vec<String> = report.entries.iter().map(|e| escape_html(&e.symbol)).collect();

    let banner = if report.no_notable_news {
        format!(
            "<div class=\"banner\">{}</div>",
            report.language.no_notable_news_banner()
        )
    } else {
        String::new()
    };

    let cards: Vec<String> = report
        .entries
        .iter()
        .map(|entry| entry_html(entry, &labels))
        .collect();

    format!(
        r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="UTF-8">
    <style>
        body {{ font-family: Arial, sans-serif; color: #333; background-color: #f5f5f5; margin: 0; padding: 20px; }}
        .container {{ max-width: 600px; margin: 0 auto; background-color: #ffffff; border-radius: 8px; overflow: hidden; }}
        .header {{ background-color: #667eea; color: white; padding: 24px; text-align: center; }}
        .header h1 {{ margin: 0; font-size: 22px; }}
        .content {{ padding: 20px; }}
        .banner {{ text-align: center; padding: 16px; color: #888; border: 1px dashed #ccc; margin-bottom: 20px; }}
        .card {{ border: 1px solid #e0e0e0; border-radius: 6px; padding: 16px; margin-bottom: 16px; background-color: #fafafa; }}
        .card-header {{ display: flex; justify-content: space-between; border-bottom: 1px solid #e0e0e0; padding-bottom: 8px; }}
        .symbol {{ font-size: 18px; font-weight: bold; }}
        .company {{ font-size: 14px; color: #666; font-weight: normal; }}
        .change {{ padding: 4px 8px; border-radius: 4px; }}
        .change.positive {{ background-color: #e8f5e9; color: #2e7d32; }}
        .change.negative {{ background-color: #ffebee; color: #c62828; }}
        .change.neutral {{ background-color: #f5f5f5; color: #616161; }}
        .range {{ font-size: 11px; color: #666; }}
        .range .low {{ color: #c62828; }}
        .range .high {{ color: #2e7d32; }}
        .summary {{ font-size: 14px; line-height: 1.6; color: #555; }}
        .links a {{ display: block; font-size: 12px; color: #667eea; }}
        .meta {{ font-size: 11px; color: #999; margin-top: 8px; }}
        .footer {{ padding: 16px; text-align: center; color: #888; font-size: 12px; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <h1>{}</h1>
            <div class="date">{}</div>
            <div class="symbols">{}: {}</div>
        </div>
        <div class="content">
            {}
            {}
        </div>
        <div class="footer">
            <p>{}</p>
            <p>{}</p>
        </div>
    </div>
</body>
</html>
"#,
        labels.title,
        report.date.format("%Y-%m-%d"),
        labels.covering,
        symbols.join(" | "),
        banner,
        cards.join("\n"),
        labels.footer,
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC"),
    )
}

// ==============================================================================
// Plain text
// ==============================================================================

/// Plain-text alternative of the digest, also printed on dry runs.
pub fn render_text(report: &DigestReport) -> String {
    let labels = labels(report.language);
    let mut out = format!("{} | {}\n", labels.title, report.date.format("%Y-%m-%d"));
    out.push_str(&"=".repeat(40));
    out.push('\n');

    if report.no_notable_news {
        out.push_str(report.language.no_notable_news_banner());
        out.push_str("\n\n");
    }

    for entry in &report.entries {
        out.push('\n');
        if entry.company_name != entry.symbol {
            out.push_str(&format!("{} ({})", entry.symbol, entry.company_name));
        } else {
            out.push_str(&entry.symbol);
        }
        out.push_str(&format!("  {}\n", format_change(entry.price_change_percent)));
        if let (Some(low), Some(high)) = (entry.week_8_low, entry.week_8_high) {
            out.push_str(&format!("{}: ${:.2} - ${:.2}\n", labels.range, low, high));
        }
        out.push_str(&entry.summary_text);
        out.push('\n');
        for url in &entry.top_links {
            out.push_str(&format!("  - {}\n", url));
        }
        out.push_str(&format!("{}: {}\n", labels.source, source_label(entry)));
    }

    out.push('\n');
    out.push_str(labels.footer);
    out.push('\n');
    out
}
