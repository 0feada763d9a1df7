use crate::domain::company::Company;
use crate::ingest::types::RawArticle;
use chrono::{DateTime, Duration, Utc};

pub const DEMO_SOURCE: &str = "NewsSpY Demo Feed";

// (title, content) templates; `{name}` is replaced with the company display name.
const GENERIC: &[(&str, &str)] = &[
    (
        "{name} Reports Strong Quarterly Results",
        "{name} delivered strong quarterly results with revenue growth ahead of analyst expectations.",
    ),
    (
        "{name} Expands Into New Markets",
        "{name} announced an expansion plan aimed at long-term growth in emerging markets.",
    ),
    (
        "Analysts Flag Margin Concern at {name}",
        "Some analysts raised a concern that rising costs could weigh on margins at {name}.",
    ),
    (
        "{name} Unveils Product Roadmap",
        "{name} outlined its product roadmap for the coming year at an investor event.",
    ),
];

fn ticker_templates(ticker: &str) -> Option<&'static [(&'static str, &'static str)]> {
    let t: &'static [(&'static str, &'static str)] = match ticker {
        "AAPL" => &[
            ("{name} Announces Revolutionary New Product Launch", "{name} has announced a breakthrough product expected to drive significant revenue growth."),
            ("{name} Reports Record Quarterly Earnings, Beats Expectations", "{name}'s latest quarterly earnings beat analyst expectations, showing strong operational efficiency."),
            ("{name} Expands AI Capabilities with Major Investment", "{name} invests heavily in artificial intelligence research, positioning itself for growth."),
            ("{name} Stock Reaches New All-Time High", "{name} shares surge to record levels as investors respond to exceptional growth."),
        ],
        "MSFT" => &[
            ("{name} Cloud Services Show Strong Growth Momentum", "{name} Azure cloud services show strong growth in the corporate sector."),
            ("{name} Partners with OpenAI for Enterprise Solutions", "{name} deepens AI integration into enterprise products, creating new revenue streams."),
            ("{name} Reports Strong Q4 Results, Raises Guidance", "{name} delivers strong quarterly results and raises full-year guidance."),
        ],
        "NVDA" => &[
            ("{name} Dominates AI Chip Market", "{name} GPU sales surge on AI demand, extending a record run of growth."),
            ("{name} Expands Data Center Business", "{name} announces new data center solutions for enterprise customers."),
            ("{name} AI Software Platform Shows Strong Adoption", "{name} AI software platform gains strong enterprise adoption."),
        ],
        "TSLA" => &[
            ("{name} Breaks Delivery Records", "{name} delivers a record number of vehicles on strong demand."),
            ("{name} Battery Breakthrough Improves Efficiency", "{name} announces a battery breakthrough that lowers cost per vehicle."),
            ("{name} Faces Recall Concern", "Regulators raised a warning about a software issue, adding risk to the near-term outlook for {name}."),
        ],
        "JPM" => &[
            ("{name} Posts Record Investment Banking Profits", "{name} investment banking division reaches record revenue."),
            ("{name} Digital Banking Platform Shows Strong Growth", "{name} digital banking gains market share, driving customer growth."),
        ],
        "WMT" => &[
            ("{name} Holiday Sales Surge", "{name} holiday sales beat expectations with strong consumer demand."),
            ("{name} E-commerce Growth Accelerates", "{name} online sales show strong growth year over year."),
        ],
        _ => return None,
    };
    Some(t)
}

/// Fixed article set used when no live source produced anything for the company.
///
/// URLs are stable per (ticker, index) so repeated runs dedupe against earlier inserts.
pub fn demo_articles(company: &Company, now: DateTime<Utc>) -> Vec<RawArticle> {
    let templates = ticker_templates(&company.ticker).unwrap_or(GENERIC);

    templates
        .iter()
        .enumerate()
        .map(|(i, (title, content))| RawArticle {
            ticker: company.ticker.clone(),
            title: title.replace("{name}", &company.name),
            content: content.replace("{name}", &company.name),
            source: DEMO_SOURCE.to_string(),
            source_url: Some(format!(
                "https://example.com/{}-news-{i}",
                company.ticker.to_ascii_lowercase()
            )),
            published_at: now - Duration::hours(2 * i as i64),
        })
        .collect()
}
