use fxhash::FxHashSet;
use scraper::{ElementRef, Selector};
use url::Url;

use crate::error::ScrapeError;

use super::JobRecord;


pub(super) fn parse_selector(selector: &str) -> Result<Selector, ScrapeError> {
    Selector::parse(selector).map_err(|e| ScrapeError::InvalidSelector {
        selector: selector.to_string(),
        reason: format!("{e:?}")
    })
}


/// Trimmed text of an element, with non-breaking spaces turned into plain ones.
fn element_text(element: ElementRef) -> String {
    element
        .text()
        .collect::<String>()
        .replace('\u{a0}', " ")
        .trim()
        .to_string()
}


/// Where a value is read from once its element is found.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Source {
    Text,
    Attr(&'static str),
    /// The `href` attribute, resolved against the page address
    Href
}


/// One attempt at reading a field. A `selector` of `None` reads the card element itself.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Strategy {
    pub(crate) selector: Option<&'static str>,
    pub(crate) source: Source
}


/// The fields of a [`JobRecord`] that are read with a [`FieldRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Field {
    JobUid,
    Title,
    Url,
    Snippet,
    Payment,
    Budget,
    Hourly,
    Posted,
    ExperienceLevel,
    Duration,
    Workload,
    LocationRequirement,
    NumProposals,
    ClientCountry,
    ClientPaymentVerified,
    ClientPaymentStatus,
    ClientSpend,
    ClientJobsPosted,
    ClientHireRate,
    ClientRating
}


impl Field {
    fn slot(self, record: &mut JobRecord) -> &mut String {
        match self {
            Self::JobUid => &mut record.job_uid,
            Self::Title => &mut record.title,
            Self::Url => &mut record.url,
            Self::Snippet => &mut record.snippet,
            Self::Payment => &mut record.payment,
            Self::Budget => &mut record.budget,
            Self::Hourly => &mut record.hourly,
            Self::Posted => &mut record.posted,
            Self::ExperienceLevel => &mut record.experience_level,
            Self::Duration => &mut record.duration,
            Self::Workload => &mut record.workload,
            Self::LocationRequirement => &mut record.location_requirement,
            Self::NumProposals => &mut record.num_proposals,
            Self::ClientCountry => &mut record.client_country,
            Self::ClientPaymentVerified => &mut record.client_payment_verified,
            Self::ClientPaymentStatus => &mut record.client_payment_status,
            Self::ClientSpend => &mut record.client_spend,
            Self::ClientJobsPosted => &mut record.client_jobs_posted,
            Self::ClientHireRate => &mut record.client_hire_rate,
            Self::ClientRating => &mut record.client_rating
        }
    }
}


/// Strategies for one field, tried in order until one yields a non-empty value.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FieldRule {
    pub(crate) field: Field,
    pub(crate) strategies: &'static [Strategy]
}


struct CompiledStrategy {
    selector: Option<Selector>,
    source: Source
}


struct CompiledRule {
    field: Field,
    strategies: Vec<CompiledStrategy>
}


/// Turns one job card into a [`JobRecord`].
pub(crate) struct FieldExtractor {
    rules: Vec<CompiledRule>,
    skills: Vec<Selector>
}


impl FieldExtractor {
    pub(crate) fn compile(rules: &[FieldRule], skills: &[&str]) -> Result<Self, ScrapeError> {
        let rules = rules
            .iter()
            .map(|rule| -> Result<CompiledRule, ScrapeError> {
                let strategies = rule
                    .strategies
                    .iter()
                    .map(|strategy| -> Result<CompiledStrategy, ScrapeError> {
                        Ok(CompiledStrategy {
                            selector: strategy.selector.map(parse_selector).transpose()?,
                            source: strategy.source
                        })
                    })
                    .collect::<Result<_, _>>()?;
                Ok(CompiledRule { field: rule.field, strategies })
            })
            .collect::<Result<_, _>>()?;
        let skills = skills
            .iter()
            .map(|selector| parse_selector(selector))
            .collect::<Result<_, _>>()?;
        Ok(Self { rules, skills })
    }

    /// Reads every field of `card`. Fields that cannot be found are left empty.
    ///
    /// Fails only if the card links somewhere that cannot be resolved against `base`.
    pub(crate) fn extract(&self, card: ElementRef, base: &Url) -> Result<JobRecord, ScrapeError> {
        let mut record = JobRecord::default();
        for rule in &self.rules {
            *rule.field.slot(&mut record) = read_field(rule, card, base)?;
        }
        record.skills = self.read_skills(card);
        record.id = record.derive_id();
        Ok(record)
    }

    fn read_skills(&self, card: ElementRef) -> Vec<String> {
        let mut skills = self
            .skills
            .iter()
            .map(|selector| {
                card.select(selector)
                    .map(element_text)
                    .filter(|token| !token.is_empty())
                    .collect::<Vec<_>>()
            })
            .find(|tokens| !tokens.is_empty())
            .unwrap_or_default();

        // exact duplicates only, "React" and "react" are both kept
        let mut seen = FxHashSet::default();
        skills.retain(|token| seen.insert(token.clone()));
        skills
    }
}


fn read_field(rule: &CompiledRule, card: ElementRef, base: &Url) -> Result<String, ScrapeError> {
    for strategy in &rule.strategies {
        let element = match &strategy.selector {
            Some(selector) => card.select(selector).next(),
            None => Some(card)
        };
        let Some(element) = element else {
            continue;
        };

        let value = match strategy.source {
            Source::Text => element_text(element),
            Source::Attr(name) => element.value().attr(name).unwrap_or_default().trim().to_string(),
            Source::Href => match element.value().attr("href").map(str::trim) {
                Some(href) if !href.is_empty() => base
                    .join(href)
                    .map_err(|source| ScrapeError::MalformedUrl { href: href.to_string(), source })?
                    .to_string(),
                _ => String::new()
            }
        };
        if !value.is_empty() {
            return Ok(value);
        }
    }
    Ok(String::new())
}
