//! Expense dashboard figures, in the base currency.

use crate::models::{Expense, ExpenseType};

/// How foreign amounts convert to the base currency.
#[derive(Debug, Clone, PartialEq)]
pub struct RateContext {
    /// Currency that needs converting; everything else counts at face value
    pub foreign_currency: String,
    /// Current global rate, used when an expense carries no snapshot
    pub live_rate: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ExpenseSummary {
    pub total: f64,
    pub public: f64,
    pub private: f64,
    /// Public total divided evenly across the roster
    pub per_person: f64,
    pub member_count: usize,
}

/// Public expenses plus the current user's own private ones.
pub fn visible_expenses<'a>(expenses: &'a [Expense], current_user: Option<&str>) -> Vec<&'a Expense> {
    expenses
        .iter()
        .filter(|e| match e.kind {
            ExpenseType::Public => true,
            ExpenseType::Private => current_user == Some(e.paid_by_member_id.as_str()),
        })
        .collect()
}

/// Base-currency value of one expense. The rate captured when the expense
/// was recorded takes precedence over the live rate.
pub fn base_amount(expense: &Expense, rates: &RateContext) -> f64 {
    if !expense.currency.eq_ignore_ascii_case(&rates.foreign_currency) {
        return expense.amount;
    }
    let rate = if expense.exchange_rate_to_base.is_finite() && expense.exchange_rate_to_base > 0.0 {
        expense.exchange_rate_to_base
    } else {
        rates.live_rate
    };
    expense.amount * rate
}

pub fn summarize(
    expenses: &[Expense],
    member_count: usize,
    current_user: Option<&str>,
    rates: &RateContext,
) -> ExpenseSummary {
    let mut summary = ExpenseSummary {
        member_count,
        ..ExpenseSummary::default()
    };

    for expense in visible_expenses(expenses, current_user) {
        let amount = base_amount(expense, rates);
        summary.total += amount;
        match expense.kind {
            ExpenseType::Public => summary.public += amount,
            ExpenseType::Private => summary.private += amount,
        }
    }

    if member_count > 0 {
        summary.per_person = summary.public / member_count as f64;
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rates(live: f64) -> RateContext {
        RateContext {
            foreign_currency: "KRW".to_string(),
            live_rate: live,
        }
    }

    fn expense(amount: f64, currency: &str, kind: ExpenseType, payer: &str, snapshot: f64) -> Expense {
        let mut e = Expense::new("x".into(), amount, currency.into(), kind, payer.into());
        e.exchange_rate_to_base = snapshot;
        e
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_public_krw_expense_converts_and_splits() {
        let expenses = vec![expense(10000.0, "KRW", ExpenseType::Public, "mem_0", 0.0058)];
        let summary = summarize(&expenses, 6, Some("mem_0"), &rates(0.0058));
        assert!(close(summary.total, 58.0));
        assert!(close(summary.public, 58.0));
        assert!(close(summary.per_person, 58.0 / 6.0));
        assert_eq!(summary.private, 0.0);
    }

    #[test]
    fn test_other_members_private_expenses_are_hidden() {
        let expenses = vec![
            expense(100.0, "HKD", ExpenseType::Private, "mem_0", 0.0),
            expense(50.0, "HKD", ExpenseType::Private, "mem_1", 0.0),
        ];
        assert_eq!(visible_expenses(&expenses, Some("mem_0")).len(), 1);

        let summary = summarize(&expenses, 6, Some("mem_0"), &rates(0.0058));
        assert!(close(summary.private, 100.0));
        assert!(close(summary.total, 100.0));
        assert_eq!(summary.per_person, 0.0);
    }

    #[test]
    fn test_snapshot_rate_wins_over_live_rate() {
        let recorded = expense(10000.0, "KRW", ExpenseType::Public, "mem_0", 0.006);
        assert!(close(base_amount(&recorded, &rates(0.0058)), 60.0));

        let legacy = expense(10000.0, "KRW", ExpenseType::Public, "mem_0", 0.0);
        assert!(close(base_amount(&legacy, &rates(0.0058)), 58.0));
    }

    #[test]
    fn test_empty_roster_has_no_split() {
        let expenses = vec![expense(10.0, "HKD", ExpenseType::Public, "mem_0", 0.0)];
        let summary = summarize(&expenses, 0, None, &rates(0.0058));
        assert_eq!(summary.per_person, 0.0);
        assert!(close(summary.public, 10.0));
    }
}
