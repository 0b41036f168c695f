//! Decrypted expense display formatting

use crate::models::{DecryptedExpense, ExpenseFields, Money};

/// Format a single expense's plaintext fields
pub fn format_expense_fields(fields: &ExpenseFields) -> String {
    let mut output = String::new();

    output.push_str(&format!("Expense: {}\n", fields.title));
    output.push_str(&format!("  Date:        {}\n", fields.date));
    output.push_str(&format!("  Amount:      {}\n", fields.amount));
    if !fields.description.is_empty() {
        output.push_str(&format!("  Description: {}\n", fields.description));
    }

    output
}

/// Format recovered expenses with their owners as a table
pub fn format_decrypted_list(expenses: &[DecryptedExpense]) -> String {
    if expenses.is_empty() {
        return "No expenses could be decrypted with the given candidates.".to_string();
    }

    let title_width = expenses
        .iter()
        .map(|e| e.fields.title.chars().count())
        .max()
        .unwrap_or(5)
        .max(5);

    let mut output = String::new();
    output.push_str(&format!(
        "{:<12}  {:<12}  {:<10}  {:<title_width$}  {:>12}\n",
        "Expense",
        "Owner",
        "Date",
        "Title",
        "Amount",
        title_width = title_width,
    ));
    output.push_str(&format!(
        "{:-<12}  {:-<12}  {:-<10}  {:-<title_width$}  {:->12}\n",
        "",
        "",
        "",
        "",
        "",
        title_width = title_width,
    ));

    for expense in expenses {
        output.push_str(&format!(
            "{:<12}  {:<12}  {:<10}  {:<title_width$}  {:>12}\n",
            expense.expense_id.to_string(),
            expense.owner.to_string(),
            expense.fields.date.to_string(),
            expense.fields.title,
            expense.fields.amount.to_string(),
            title_width = title_width,
        ));
    }

    let total: Money = expenses.iter().map(|e| e.fields.amount).sum();
    output.push_str(&format!(
        "\n{} expense(s), total {}\n",
        expenses.len(),
        total
    ));

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ExpenseId, UserId};
    use chrono::NaiveDate;

    fn fields(title: &str, cents: i64) -> ExpenseFields {
        ExpenseFields::new(
            title,
            NaiveDate::from_ymd_opt(2025, 1, 31).unwrap(),
            Money::from_cents(cents),
            "",
        )
    }

    #[test]
    fn test_format_fields_skips_empty_description() {
        let output = format_expense_fields(&fields("Parking", 700));

        assert!(output.contains("Parking"));
        assert!(output.contains("$7.00"));
        assert!(output.contains("2025-01-31"));
        assert!(!output.contains("Description"));
    }

    #[test]
    fn test_format_decrypted_list_total() {
        let owner = UserId::new();
        let expenses = vec![
            DecryptedExpense {
                expense_id: ExpenseId::new(),
                owner,
                fields: fields("Coffee", 450),
            },
            DecryptedExpense {
                expense_id: ExpenseId::new(),
                owner,
                fields: fields("Bagels", 1050),
            },
        ];

        let output = format_decrypted_list(&expenses);
        assert!(output.contains(&owner.to_string()));
        assert!(output.contains("2 expense(s), total $15.00"));
    }

    #[test]
    fn test_format_empty() {
        assert!(format_decrypted_list(&[]).starts_with("No expenses"));
    }
}
