use crate::domain::entities::plan_type::PlanType;

/// Plan tier and credit allowance granted for one billing period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanAllowance {
    pub plan_type: PlanType,
    pub credits: i64,
}

#[derive(Debug, Clone)]
struct PlanRule {
    keyword: String,
    allowance: PlanAllowance,
}

/// Maps a product display name to its allowance.
///
/// Rules are checked in order; the first rule whose keyword appears as a whole
/// word of the name (case-insensitive) wins. Names matching no rule get the fallback.
/// Shared by the webhook reconciler and the checkout flow so both grant the
/// same amounts.
#[derive(Debug, Clone)]
pub struct PlanCreditTable {
    rules: Vec<PlanRule>,
    fallback: PlanAllowance,
}

pub const STANDARD_CREDITS: i64 = 500;
pub const PRO_CREDITS: i64 = 2000;
pub const FREE_CREDITS: i64 = 20;

impl PlanCreditTable {
    pub fn new(rules: Vec<(&str, PlanAllowance)>, fallback: PlanAllowance) -> Self {
        Self {
            rules: rules
                .into_iter()
                .map(|(keyword, allowance)| PlanRule {
                    keyword: keyword.to_lowercase(),
                    allowance,
                })
                .collect(),
            fallback,
        }
    }

    pub fn allowance_for(&self, plan_name: &str) -> PlanAllowance {
        let name = plan_name.to_lowercase();
        let words: Vec<&str> = name
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        self.rules
            .iter()
            .find(|rule| words.contains(&rule.keyword.as_str()))
            .map(|rule| rule.allowance)
            .unwrap_or(self.fallback)
    }
}

impl Default for PlanCreditTable {
    fn default() -> Self {
        let standard = PlanAllowance {
            plan_type: PlanType::Standard,
            credits: STANDARD_CREDITS,
        };
        let pro = PlanAllowance {
            plan_type: PlanType::Pro,
            credits: PRO_CREDITS,
        };
        Self::new(
            vec![("standard", standard), ("pro", pro), ("enterprise", pro)],
            PlanAllowance {
                plan_type: PlanType::Free,
                credits: FREE_CREDITS,
            },
        )
    }
}
