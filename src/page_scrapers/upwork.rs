use super::{
    cards::CardStrategy,
    fields::{Field, FieldRule, Source, Strategy},
    PageScraper
};

const TITLE_LINK: &str = r#"[data-test="job-tile-title-link"]"#;
const JOB_LINK: &str = r#"a[href*="/jobs/"]"#;
const FEEDBACK: &str = r#"[data-test="total-feedback"]"#;


macro_rules! strategy {
    (text $selector: expr) => {
        Strategy { selector: Some($selector), source: Source::Text }
    };
    (href $selector: expr) => {
        Strategy { selector: Some($selector), source: Source::Href }
    };
    (attr $selector: expr, $name: expr) => {
        Strategy { selector: Some($selector), source: Source::Attr($name) }
    };
    (own $name: expr) => {
        Strategy { selector: None, source: Source::Attr($name) }
    };
}


macro_rules! rules {
    ($($field: ident => [$(($($strategy: tt)+)),+ $(,)?]),+ $(,)?) => {
        &[$(
            FieldRule { field: Field::$field, strategies: &[$(strategy!($($strategy)+)),+] }
        ),+]
    };
}


/// A scraper for the Upwork job search page
pub(crate) struct UpworkScraper;

impl PageScraper for UpworkScraper {
    const NAME: &'static str = "upwork";

    const CARDS: &'static [CardStrategy] = &[
        CardStrategy::Marker(r#"article[data-ev-job-uid], article[data-job-uid]"#),
        CardStrategy::UnderContainer {
            container: r#"[data-test="job-tile-list"]"#,
            tiles: r#"[data-test="UpCJobTile"], [data-test="job-tile-list"] article, article[data-test], li[data-test*="job"]"#
        },
        CardStrategy::AnchorAncestor {
            anchor: JOB_LINK,
            containers: &["article", "li", "div"]
        }
    ];

    const FIELDS: &'static [FieldRule] = rules![
        JobUid => [(own "data-ev-job-uid"), (own "data-job-uid")],
        Title => [(text TITLE_LINK), (text JOB_LINK)],
        Url => [(href TITLE_LINK), (href JOB_LINK)],
        Snippet => [(text r#"[data-test="UpCLineClamp JobDescription"]"#), (text r#"[data-test="job-description-text"]"#)],
        // the site really spells it "pubilshed"
        Posted => [(text r#"[data-test="job-pubilshed-date"]"#), (text r#"[data-test="job-published-date"]"#)],
        Payment => [(text r#"[data-test="job-type-label"]"#)],
        Hourly => [(text r#"[data-test="job-type-label"]"#)],
        Budget => [(text r#"[data-test="is-fixed-price"]"#)],
        NumProposals => [(text r#"[data-test="proposals-tier"]"#)],
        ExperienceLevel => [(text r#"[data-test="experience-level"]"#), (text r#"[data-test="contractor-tier"]"#)],
        Duration => [(text r#"[data-test="duration-label"]"#)],
        Workload => [(text r#"[data-test="workload"]"#)],
        LocationRequirement => [(text r#"[data-test="location"]"#), (text r#"[data-test*="location"]"#)],
        ClientCountry => [(text r#"[data-test="location"]"#)],
        ClientPaymentStatus => [(text r#"[data-test="total-spent"]"#)],
        ClientPaymentVerified => [(text r#"[data-test="payment-verified"]"#)],
        ClientSpend => [(text r#"[data-test="total-spend"]"#)],
        ClientJobsPosted => [(text r#"[data-test="client-jobs-posted"]"#)],
        ClientHireRate => [(text r#"[data-test="client-hire-rate"]"#)],
        ClientRating => [(attr r#"[data-test="total-feedback"] [aria-label]"#, "aria-label"), (text FEEDBACK)],
    ];

    const SKILLS: &'static [&'static str] = &[
        r#"[data-test="TokenClamp JobAttrs"] [data-test="token"]"#,
        r#"[data-test="token-Chip"]"#
    ];
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_scrapers::ListingScraper;

    #[test]
    fn every_selector_parses() {
        assert!(ListingScraper::for_site::<UpworkScraper>().is_ok());
    }

    #[test]
    fn every_field_is_covered_once() {
        let fields = UpworkScraper::FIELDS;
        for rule in fields {
            assert_eq!(fields.iter().filter(|other| other.field == rule.field).count(), 1, "{:?}", rule.field);
        }
        assert_eq!(fields.len(), 20);
    }
}
