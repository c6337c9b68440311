//! Net income calculator
//!
//! From an invoiced amount (excluding VAT) to gross salary, deductions and
//! payout, for consultants paid through the platform.

use serde::{Deserialize, Serialize};

use super::amount::{format_amount, format_percent};
use crate::language::Language;

/// Rates used by the calculation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SalaryAssumptions {
    pub employer_fee_rate: f64,
    pub tax_rate: f64,
    pub vacation_rate: f64,
    pub pension_rate: f64,
    pub platform_fee_rate: f64,
    /// Tax-free reimbursements added to the payout, in currency units
    pub tax_free_reimbursement: f64,
}

impl Default for SalaryAssumptions {
    fn default() -> Self {
        Self {
            employer_fee_rate: 0.3142,
            tax_rate: 0.30,
            vacation_rate: 0.12,
            pension_rate: 0.0,
            platform_fee_rate: 0.0,
            tax_free_reimbursement: 0.0,
        }
    }
}

fn clamp_rate(v: f64, max: f64) -> f64 {
    if v.is_finite() {
        v.clamp(0.0, max)
    } else {
        0.0
    }
}

impl SalaryAssumptions {
    /// Tax within [0, 0.6], every other rate within [0, 1]
    pub fn clamped(self) -> Self {
        Self {
            employer_fee_rate: clamp_rate(self.employer_fee_rate, 1.0),
            tax_rate: clamp_rate(self.tax_rate, 0.6),
            vacation_rate: clamp_rate(self.vacation_rate, 1.0),
            pension_rate: clamp_rate(self.pension_rate, 1.0),
            platform_fee_rate: clamp_rate(self.platform_fee_rate, 1.0),
            tax_free_reimbursement: if self.tax_free_reimbursement.is_finite() {
                self.tax_free_reimbursement.max(0.0)
            } else {
                0.0
            },
        }
    }

    /// Apply per-turn overrides on top of these rates
    pub fn with_overrides(mut self, overrides: &AssumptionOverrides) -> Self {
        if let Some(v) = overrides.employer_fee_rate {
            self.employer_fee_rate = v;
        }
        if let Some(v) = overrides.tax_rate {
            self.tax_rate = v;
        }
        if let Some(v) = overrides.vacation_rate {
            self.vacation_rate = v;
        }
        if let Some(v) = overrides.pension_rate {
            self.pension_rate = v;
        }
        if let Some(v) = overrides.platform_fee_rate {
            self.platform_fee_rate = v;
        }
        if let Some(v) = overrides.tax_free_reimbursement {
            self.tax_free_reimbursement = v;
        }
        self
    }
}

/// Request-supplied overrides; absent fields keep the defaults
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssumptionOverrides {
    pub employer_fee_rate: Option<f64>,
    pub tax_rate: Option<f64>,
    pub vacation_rate: Option<f64>,
    pub pension_rate: Option<f64>,
    pub platform_fee_rate: Option<f64>,
    pub tax_free_reimbursement: Option<f64>,
}

/// Result of one calculation, rounded to whole currency units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetSalaryBreakdown {
    pub invoice: f64,
    pub after_fee: f64,
    pub gross: f64,
    pub pension: f64,
    pub vacation: f64,
    pub tax: f64,
    pub net: f64,
    pub tax_free: f64,
    pub payout: f64,
    pub assumptions: SalaryAssumptions,
}

/// Run the calculation for an invoiced amount excluding VAT
pub fn calculate(invoice: f64, assumptions: SalaryAssumptions) -> NetSalaryBreakdown {
    let a = assumptions.clamped();
    let invoice = invoice.max(0.0);

    let after_fee = invoice * (1.0 - a.platform_fee_rate);
    let gross = after_fee / (1.0 + a.employer_fee_rate);
    let pension = a.pension_rate * gross;
    let vacation = a.vacation_rate * gross;
    let tax = (gross - pension) * a.tax_rate;
    let net = gross - tax - pension - vacation;
    let payout = net + a.tax_free_reimbursement;

    NetSalaryBreakdown {
        invoice: invoice.round(),
        after_fee: after_fee.round(),
        gross: gross.round(),
        pension: pension.round(),
        vacation: vacation.round(),
        tax: tax.round(),
        net: net.round(),
        tax_free: a.tax_free_reimbursement.round(),
        payout: payout.round(),
        assumptions: a,
    }
}

struct Labels {
    heading: &'static str,
    after_fee: &'static str,
    gross: &'static str,
    pension: &'static str,
    vacation: &'static str,
    tax: &'static str,
    net: &'static str,
    tax_free: &'static str,
    payout: &'static str,
    follow_up: &'static str,
}

fn labels(lang: Language) -> Labels {
    match lang {
        Language::Sv => Labels {
            heading: "Här är din uppskattning för {amount} exkl. moms:",
            after_fee: "Efter plattformsavgift",
            gross: "Bruttolön (arbetsgivaravgift {pct} avdragen)",
            pension: "Pension",
            vacation: "Semesterersättning",
            tax: "Preliminär skatt",
            net: "Nettolön",
            tax_free: "Skattefria ersättningar",
            payout: "Utbetalning totalt",
            follow_up: "Vill du finjustera med din skattetabell eller jämföra mot fakturering via eget AB?",
        },
        Language::En => Labels {
            heading: "Here is your estimate for {amount} excluding VAT:",
            after_fee: "After platform fee",
            gross: "Gross salary (employer contributions {pct} deducted)",
            pension: "Pension",
            vacation: "Vacation pay",
            tax: "Preliminary tax",
            net: "Net salary",
            tax_free: "Tax-free reimbursements",
            payout: "Total payout",
            follow_up: "Want to fine-tune it with your own tax rate or compare with invoicing through your own company?",
        },
        Language::No => Labels {
            heading: "Her er anslaget ditt for {amount} eks. mva:",
            after_fee: "Etter plattformavgift",
            gross: "Bruttolønn (arbeidsgiveravgift {pct} trukket fra)",
            pension: "Pensjon",
            vacation: "Feriepenger",
            tax: "Forskuddstrekk",
            net: "Nettolønn",
            tax_free: "Skattefrie godtgjørelser",
            payout: "Utbetaling totalt",
            follow_up: "Vil du justere med din egen skattesats eller sammenligne med fakturering via eget AS?",
        },
        Language::Da => Labels {
            heading: "Her er dit overslag for {amount} ekskl. moms:",
            after_fee: "Efter platformsgebyr",
            gross: "Bruttoløn (arbejdsgiverafgift {pct} fratrukket)",
            pension: "Pension",
            vacation: "Feriepenge",
            tax: "A-skat",
            net: "Nettoløn",
            tax_free: "Skattefri godtgørelse",
            payout: "Udbetaling i alt",
            follow_up: "Vil du justere med din egen skatteprocent eller sammenligne med fakturering via eget ApS?",
        },
    }
}

/// Render the breakdown as a short bullet list in the visitor's language
pub fn format_breakdown(b: &NetSalaryBreakdown, lang: Language) -> String {
    let l = labels(lang);
    let a = &b.assumptions;
    let money = |v: f64| format_amount(v, lang);
    let pct = |v: f64| format_percent(v, lang);

    let mut lines = vec![l.heading.replace("{amount}", &money(b.invoice))];
    if a.platform_fee_rate > 0.0 {
        lines.push(format!(
            "• {} ({}): {}",
            l.after_fee,
            pct(a.platform_fee_rate),
            money(b.after_fee)
        ));
    }
    lines.push(format!(
        "• {}: {}",
        l.gross.replace("{pct}", &pct(a.employer_fee_rate)),
        money(b.gross)
    ));
    if b.pension > 0.0 {
        lines.push(format!("• {} ({}): −{}", l.pension, pct(a.pension_rate), money(b.pension)));
    }
    if b.vacation > 0.0 {
        lines.push(format!("• {} ({}): −{}", l.vacation, pct(a.vacation_rate), money(b.vacation)));
    }
    lines.push(format!("• {} ({}): −{}", l.tax, pct(a.tax_rate), money(b.tax)));
    lines.push(format!("• {}: {}", l.net, money(b.net)));
    if b.tax_free > 0.0 {
        lines.push(format!("• {}: +{}", l.tax_free, money(b.tax_free)));
    }
    lines.push(format!("= {}: {}", l.payout, money(b.payout)));
    lines.push(String::new());
    lines.push(l.follow_up.to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_default_calculation() {
        let b = calculate(100_000.0, SalaryAssumptions::default());
        // 100000 / 1.3142
        assert_eq!(b.gross, 76092.0);
        assert_eq!(b.vacation, 9131.0);
        assert_eq!(b.tax, 22828.0);
        assert_eq!(b.net, 44133.0);
        assert_eq!(b.payout, 44133.0);
        assert_eq!(b.after_fee, 100_000.0);
    }

    #[test]
    fn test_rates_are_clamped() {
        let a = SalaryAssumptions {
            tax_rate: 0.9,
            vacation_rate: -0.5,
            ..Default::default()
        }
        .clamped();
        assert_eq!(a.tax_rate, 0.6);
        assert_eq!(a.vacation_rate, 0.0);
    }

    #[test]
    fn test_overrides() {
        let overrides = AssumptionOverrides {
            tax_rate: Some(0.32),
            tax_free_reimbursement: Some(1500.0),
            ..Default::default()
        };
        let a = SalaryAssumptions::default().with_overrides(&overrides);
        assert_eq!(a.tax_rate, 0.32);
        assert_eq!(a.employer_fee_rate, 0.3142);

        let b = calculate(50_000.0, a);
        assert_eq!(b.payout, b.net + 1500.0);
    }

    #[test]
    fn test_breakdown_text() {
        let b = calculate(100_000.0, SalaryAssumptions::default());
        let text = format_breakdown(&b, Language::Sv);
        assert!(text.starts_with("Här är din uppskattning för 100 000 kr"));
        assert!(text.contains("Bruttolön"));
        assert!(text.contains("Preliminär skatt (30 %): −22 828 kr"));
        assert!(text.contains("Nettolön: 44 133 kr"));
        assert!(!text.contains("Pension"));

        let text = format_breakdown(&b, Language::En);
        assert!(text.contains("Net salary: SEK 44,133"));
    }

    proptest! {
        #[test]
        fn prop_net_is_monotonic(a in 0.0f64..5_000_000.0, delta in 0.0f64..100_000.0) {
            let low = calculate(a, SalaryAssumptions::default());
            let high = calculate(a + delta, SalaryAssumptions::default());
            prop_assert!(high.net + 1.0 >= low.net);
        }

        #[test]
        fn prop_gross_reconstructs_after_fee(invoice in 0.0f64..5_000_000.0, fee in 0.0f64..0.5) {
            let a = SalaryAssumptions { employer_fee_rate: fee, ..Default::default() };
            let b = calculate(invoice, a);
            let diff = b.after_fee - b.gross * (1.0 + fee);
            prop_assert!(diff.abs() <= 0.5 * (1.0 + fee) + 0.5);
        }
    }
}
