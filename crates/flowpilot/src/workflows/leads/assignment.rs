use std::collections::{BTreeMap, BTreeSet};

use super::domain::{Assignment, CompanyId, Lead};
use super::repository::{LeadRepository, RepositoryError};

const SCORE_PROXIMITY_POINTS: f64 = 30.0;
const SOURCE_MATCH_POINTS: f64 = 40.0;
const HIGH_QUALITY_POINTS: f64 = 30.0;
const DEFAULT_HIGH_QUALITY_SCORE: u8 = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssignmentConfig {
    /// Leads scoring above this earn the high-quality bonus for every assignee.
    pub high_quality_score: u8,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            high_quality_score: DEFAULT_HIGH_QUALITY_SCORE,
        }
    }
}

/// Historical track record of one assignee.
#[derive(Debug, Clone, PartialEq)]
pub struct AssigneeProfile {
    pub total_leads: u32,
    pub conversions: u32,
    pub average_score: f64,
    pub sources: BTreeSet<String>,
}

impl AssigneeProfile {
    pub fn conversion_rate(&self) -> f64 {
        if self.total_leads == 0 {
            0.0
        } else {
            f64::from(self.conversions) / f64::from(self.total_leads)
        }
    }
}

/// Profiles keyed by assignee, built from the tenant's previously assigned leads.
pub fn build_profiles<'a>(history: impl IntoIterator<Item = &'a Lead>) -> BTreeMap<String, AssigneeProfile> {
    let mut totals: BTreeMap<String, (AssigneeProfile, u64)> = BTreeMap::new();

    for lead in history {
        let Some(assignee) = lead.assignee() else {
            continue;
        };

        let (profile, score_sum) = totals.entry(assignee.to_string()).or_insert_with(|| {
            (
                AssigneeProfile {
                    total_leads: 0,
                    conversions: 0,
                    average_score: 0.0,
                    sources: BTreeSet::new(),
                },
                0,
            )
        });

        profile.total_leads += 1;
        if lead.converted {
            profile.conversions += 1;
        }
        *score_sum += u64::from(lead.score.unwrap_or(0));
        profile.sources.insert(lead.source.clone());
    }

    totals
        .into_iter()
        .map(|(assignee, (mut profile, score_sum))| {
            profile.average_score = score_sum as f64 / f64::from(profile.total_leads);
            (assignee, profile)
        })
        .collect()
}

/// Composite fit of `lead` for an assignee with `profile`, out of 100.
pub fn match_score(lead: &Lead, profile: &AssigneeProfile, config: &AssignmentConfig) -> f64 {
    let score = lead.score.unwrap_or(0);
    let mut total = 0.0;

    let distance = (f64::from(score) - profile.average_score).abs();
    total += (SCORE_PROXIMITY_POINTS - distance).max(0.0);

    if profile.sources.contains(&lead.source) {
        total += SOURCE_MATCH_POINTS;
    }

    if score > config.high_quality_score {
        total += HIGH_QUALITY_POINTS;
    }

    total
}

/// Pick the best-matching assignee. Ties go to the alphabetically first assignee.
pub fn predict_best_assignee(
    lead: &Lead,
    history: &[Lead],
    config: &AssignmentConfig,
) -> Assignment {
    let profiles = build_profiles(history.iter().filter(|past| past.id != lead.id));

    let mut best: Option<(&String, &AssigneeProfile, f64)> = None;
    for (assignee, profile) in &profiles {
        let fit = match_score(lead, profile, config);
        if best.map_or(true, |(_, _, top)| fit > top) {
            best = Some((assignee, profile, fit));
        }
    }

    match best {
        Some((assignee, profile, _)) => {
            let confidence = (profile.conversion_rate() * 100.0).round().clamp(0.0, 100.0) as u8;
            Assignment {
                assignee: Some(assignee.clone()),
                confidence,
                reason: format!("{confidence}% historical conversion rate with similar leads"),
            }
        }
        None => Assignment::unassigned("No historical data available"),
    }
}

/// Store-backed wrapper around [`predict_best_assignee`].
#[derive(Debug, Clone, Default)]
pub struct AssignmentHeuristic {
    config: AssignmentConfig,
}

impl AssignmentHeuristic {
    pub fn new(config: AssignmentConfig) -> Self {
        Self { config }
    }

    pub fn predict<R>(
        &self,
        repository: &R,
        company_id: &CompanyId,
        lead: &Lead,
    ) -> Result<Assignment, RepositoryError>
    where
        R: LeadRepository + ?Sized,
    {
        let history = repository.leads_for_company(company_id)?;
        Ok(predict_best_assignee(lead, &history, &self.config))
    }
}
