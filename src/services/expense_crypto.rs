//! Expense encryption service
//!
//! Encrypts the four shared expense fields under the acting member's derived
//! key, decrypts them for a known owner, and recovers owners of a batch of
//! records by trial decryption over a caller-supplied candidate list.
//!
//! Nothing records which member encrypted a row. In a batch, a record whose
//! author is not among the candidates is silently absent from the result.

use chrono::NaiveDate;
use tracing::{debug, error, info, warn};

use crate::config::DerivationSettings;
use crate::crypto::{DecryptOutcome, DerivedUserKey, FieldCipher, GroupKeyDerivation, KeyProtector};
use crate::error::{SplitError, SplitResult};
use crate::models::expense::FIELD_DATE_FORMAT;
use crate::models::{
    DecryptedExpense, EncryptedExpense, ExpenseField, ExpenseFields, ExpenseId, GroupId, Money,
    RotationTag, UserId,
};
use crate::storage::MasterKeyStore;

use super::cancellation::Cancellation;

/// What one candidate key did to one record
enum RecordOutcome {
    Opened(ExpenseFields),
    WrongKey,
    Malformed(String),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum RecordState {
    Pending,
    Opened,
    Malformed,
}

/// Service for expense field encryption
pub struct ExpenseCryptoService<'a> {
    derivation: GroupKeyDerivation<'a>,
    cipher: FieldCipher,
    params: DerivationSettings,
}

impl<'a> ExpenseCryptoService<'a> {
    /// Create a new expense crypto service
    pub fn new(
        store: &'a dyn MasterKeyStore,
        protector: &'a dyn KeyProtector,
        cipher: FieldCipher,
        params: DerivationSettings,
    ) -> SplitResult<Self> {
        params.validate()?;
        Ok(Self {
            derivation: GroupKeyDerivation::new(store, protector),
            cipher,
            params,
        })
    }

    /// Derive a member key, treating a missing master key as fatal
    fn member_key(
        &self,
        user_id: &UserId,
        group_id: &GroupId,
        tag: &RotationTag,
    ) -> SplitResult<DerivedUserKey> {
        let derived = self.derivation.derive_user_key(
            self.params.iterations,
            self.params.output_length,
            user_id,
            group_id,
            tag,
        );

        match derived {
            Ok(Some(key)) => Ok(key),
            Ok(None) => {
                error!(group = %group_id, "No master key stored for group in use");
                Err(SplitError::KeyDerivation(format!(
                    "No master key stored for group {}",
                    group_id
                )))
            }
            Err(e @ SplitError::KeyDerivation(_)) => {
                error!(group = %group_id, error = %e, "Master key could not be unprotected");
                Err(e)
            }
            Err(e) => Err(e),
        }
    }

    /// Encrypt an expense's fields as `user_id`
    ///
    /// Either all four fields are encrypted or an error is returned.
    pub fn encrypt_expense(
        &self,
        user_id: &UserId,
        group_id: &GroupId,
        tag: &RotationTag,
        expense_id: ExpenseId,
        fields: &ExpenseFields,
    ) -> SplitResult<EncryptedExpense> {
        let key = self.member_key(user_id, group_id, tag)?;
        let key = key.aes_key()?;

        let encrypted = EncryptedExpense {
            id: expense_id,
            title: self.cipher.encrypt(&fields.title, key)?,
            date: self.cipher.encrypt(&fields.date_plaintext(), key)?,
            amount: self.cipher.encrypt(&fields.amount_plaintext(), key)?,
            description: self.cipher.encrypt(&fields.description, key)?,
        };

        debug!(expense = %expense_id, group = %group_id, "Encrypted expense fields");
        Ok(encrypted)
    }

    /// Decrypt an expense whose owner the caller already knows
    ///
    /// A wrong owner or tampered field is an `AuthenticationFailure`.
    pub fn decrypt_expense<C: Cancellation + ?Sized>(
        &self,
        user_id: &UserId,
        group_id: &GroupId,
        tag: &RotationTag,
        expense: &EncryptedExpense,
        cancel: &C,
    ) -> SplitResult<ExpenseFields> {
        if cancel.is_cancelled() {
            return Err(SplitError::Cancelled);
        }
        let key = self.member_key(user_id, group_id, tag)?;
        if cancel.is_cancelled() {
            return Err(SplitError::Cancelled);
        }

        let key = key.aes_key()?;
        let [title, date, amount, description] = expense
            .fields()
            .map(|(_, field)| self.cipher.try_decrypt(field.as_str(), key).into_result());

        parse_fields(title?, date?, amount?, description?)
    }

    /// Recover and decrypt a batch of records by trying each candidate's key
    ///
    /// Output is ordered by candidate, then by input order. A record appears at
    /// most once. Cancellation aborts the whole batch with no partial result.
    pub fn decrypt_expenses_for_candidates<C: Cancellation + ?Sized>(
        &self,
        group_id: &GroupId,
        candidates: &[UserId],
        expenses: &[EncryptedExpense],
        tag: &RotationTag,
        cancel: &C,
    ) -> SplitResult<Vec<DecryptedExpense>> {
        let mut states = vec![RecordState::Pending; expenses.len()];
        let mut results = Vec::new();

        for candidate in candidates {
            if !states.contains(&RecordState::Pending) {
                break;
            }
            if cancel.is_cancelled() {
                return Err(SplitError::Cancelled);
            }

            // One derivation per candidate; dropped (and zeroed) at end of iteration
            let key = self.member_key(candidate, group_id, tag)?;
            let key = key.aes_key()?;

            for (expense, state) in expenses.iter().zip(states.iter_mut()) {
                if *state != RecordState::Pending {
                    continue;
                }
                if cancel.is_cancelled() {
                    return Err(SplitError::Cancelled);
                }

                match self.open_record(expense, key) {
                    RecordOutcome::Opened(fields) => {
                        debug!(expense = %expense.id, owner = %candidate, "Record opened");
                        *state = RecordState::Opened;
                        results.push(DecryptedExpense {
                            expense_id: expense.id,
                            owner: *candidate,
                            fields,
                        });
                    }
                    RecordOutcome::WrongKey => {}
                    RecordOutcome::Malformed(reason) => {
                        debug!(expense = %expense.id, reason = %reason, "Record is malformed");
                        *state = RecordState::Malformed;
                    }
                }
            }
        }

        let malformed = states.iter().filter(|s| **s == RecordState::Malformed).count();
        let unmatched = states.iter().filter(|s| **s == RecordState::Pending).count();
        if malformed > 0 {
            warn!(group = %group_id, malformed, "Skipped malformed expense records");
        }
        info!(
            group = %group_id,
            decrypted = results.len(),
            unmatched,
            malformed,
            "Batch decryption finished"
        );

        Ok(results)
    }

    /// Try one key against one record
    ///
    /// The title decides ownership. Once the title authenticates, any other
    /// field failing means the record itself is damaged.
    fn open_record(&self, expense: &EncryptedExpense, key: &[u8; 32]) -> RecordOutcome {
        let mut plaintexts: Vec<String> = Vec::with_capacity(4);

        for (field, encoded) in expense.fields() {
            match self.cipher.try_decrypt(encoded.as_str(), key) {
                DecryptOutcome::Decrypted(text) => plaintexts.push(text),
                DecryptOutcome::WrongKey if field == ExpenseField::Title => {
                    return RecordOutcome::WrongKey;
                }
                DecryptOutcome::WrongKey => {
                    return RecordOutcome::Malformed(format!(
                        "title authenticated but {} did not",
                        field
                    ));
                }
                DecryptOutcome::Malformed(reason) => {
                    return RecordOutcome::Malformed(format!("{}: {}", field, reason));
                }
            }
        }

        let mut plaintexts = plaintexts.into_iter();
        let (Some(title), Some(date), Some(amount), Some(description)) = (
            plaintexts.next(),
            plaintexts.next(),
            plaintexts.next(),
            plaintexts.next(),
        ) else {
            return RecordOutcome::Malformed("missing fields".into());
        };

        match parse_fields(title, date, amount, description) {
            Ok(fields) => RecordOutcome::Opened(fields),
            Err(e) => RecordOutcome::Malformed(e.to_string()),
        }
    }
}

/// Rebuild typed fields from decrypted plaintexts
fn parse_fields(
    title: String,
    date: String,
    amount: String,
    description: String,
) -> SplitResult<ExpenseFields> {
    let date = NaiveDate::parse_from_str(&date, FIELD_DATE_FORMAT)
        .map_err(|_| SplitError::MalformedInput(format!("Invalid date plaintext '{}'", date)))?;
    let amount = Money::parse_field(&amount)
        .map_err(|e| SplitError::MalformedInput(format!("Invalid amount plaintext: {}", e)))?;

    Ok(ExpenseFields {
        title,
        date,
        amount,
        description,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AeadKeyProtector, FieldFormat, ProtectionKey};
    use crate::models::EncryptedField;
    use crate::services::cancellation::NeverCancelled;
    use crate::storage::group_keys::{create_test_repo, GroupKeyRepository};
    use std::cell::Cell;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio_util::sync::CancellationToken;

    const FAST: DerivationSettings = DerivationSettings {
        iterations: 50,
        output_length: 32,
    };

    /// Reports cancelled once it has been polled `after` times
    struct CancelAfter {
        after: usize,
        polls: Cell<usize>,
    }

    impl CancelAfter {
        fn new(after: usize) -> Self {
            Self {
                after,
                polls: Cell::new(0),
            }
        }
    }

    impl Cancellation for CancelAfter {
        fn is_cancelled(&self) -> bool {
            let polls = self.polls.get() + 1;
            self.polls.set(polls);
            polls > self.after
        }
    }

    fn protector() -> AeadKeyProtector {
        AeadKeyProtector::new(ProtectionKey::from_bytes([5u8; 32]))
    }

    fn new_group(repo: &GroupKeyRepository, p: &AeadKeyProtector) -> GroupId {
        let group = GroupId::new();
        let blob = GroupKeyDerivation::new(repo, p).protect(&group).unwrap();
        repo.put_protected_key(&group, blob).unwrap();
        group
    }

    fn fields(title: &str, cents: i64) -> ExpenseFields {
        ExpenseFields::new(
            title,
            NaiveDate::from_ymd_opt(2025, 6, 14).unwrap(),
            Money::from_cents(cents),
            "split three ways",
        )
    }

    #[test]
    fn test_encrypt_then_decrypt_for_owner() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let user = UserId::new();
        let tag = RotationTag::new("t1");
        let original = fields("Dinner", 8640);

        let encrypted = service
            .encrypt_expense(&user, &group, &tag, ExpenseId::new(), &original)
            .unwrap();
        assert_ne!(encrypted.title.as_str(), "Dinner");

        let decrypted = service
            .decrypt_expense(&user, &group, &tag, &encrypted, &NeverCancelled)
            .unwrap();
        assert_eq!(decrypted, original);
    }

    #[test]
    fn test_encrypt_without_group_key_fails() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();

        let err = service
            .encrypt_expense(
                &UserId::new(),
                &GroupId::new(),
                &RotationTag::new("t"),
                ExpenseId::new(),
                &fields("Taxi", 1200),
            )
            .unwrap_err();

        assert!(matches!(err, SplitError::KeyDerivation(_)));
        assert!(err.is_internal());
    }

    #[test]
    fn test_invalid_params_rejected() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let params = DerivationSettings {
            iterations: 0,
            output_length: 32,
        };

        let result = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), params);
        assert!(matches!(result, Err(SplitError::Validation(_))));
    }

    #[test]
    fn test_decrypt_as_wrong_owner_is_authentication_failure() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let tag = RotationTag::new("t1");

        let encrypted = service
            .encrypt_expense(&UserId::new(), &group, &tag, ExpenseId::new(), &fields("Hotel", 30000))
            .unwrap();

        let err = service
            .decrypt_expense(&UserId::new(), &group, &tag, &encrypted, &NeverCancelled)
            .unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_ownership_recovery_finds_author() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let tag = RotationTag::new("T");
        let original = fields("Groceries", 4250);
        let id = ExpenseId::new();

        let encrypted = service.encrypt_expense(&b, &group, &tag, id, &original).unwrap();

        let results = service
            .decrypt_expenses_for_candidates(&group, &[a, b, c], &[encrypted], &tag, &NeverCancelled)
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].expense_id, id);
        assert_eq!(results[0].owner, b);
        assert_eq!(results[0].fields, original);
    }

    #[test]
    fn test_owner_outside_candidates_is_dropped() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let (a, b, c) = (UserId::new(), UserId::new(), UserId::new());
        let tag = RotationTag::new("T");

        let encrypted = service
            .encrypt_expense(&b, &group, &tag, ExpenseId::new(), &fields("Groceries", 4250))
            .unwrap();

        let results = service
            .decrypt_expenses_for_candidates(&group, &[a, c], &[encrypted], &tag, &NeverCancelled)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_rotation_tag_changes_keys() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let b = UserId::new();
        let (t1, t2) = (RotationTag::new("T1"), RotationTag::new("T2"));

        let k1 = service.member_key(&b, &group, &t1).unwrap();
        let k2 = service.member_key(&b, &group, &t2).unwrap();
        assert_ne!(k1.as_bytes(), k2.as_bytes());

        let encrypted = service
            .encrypt_expense(&b, &group, &t1, ExpenseId::new(), &fields("Fuel", 5500))
            .unwrap();

        let err = service
            .decrypt_expense(&b, &group, &t2, &encrypted, &NeverCancelled)
            .unwrap_err();
        assert!(err.is_authentication_failure());

        let results = service
            .decrypt_expenses_for_candidates(&group, &[b], &[encrypted], &t2, &NeverCancelled)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_batch_orders_by_candidate_then_input() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let (a, b) = (UserId::new(), UserId::new());
        let tag = RotationTag::new("T");

        let records: Vec<EncryptedExpense> = [(b, "one"), (a, "two"), (b, "three"), (a, "four")]
            .iter()
            .map(|(user, title)| {
                service
                    .encrypt_expense(user, &group, &tag, ExpenseId::new(), &fields(title, 100))
                    .unwrap()
            })
            .collect();

        let results = service
            .decrypt_expenses_for_candidates(&group, &[a, b], &records, &tag, &NeverCancelled)
            .unwrap();

        let titles: Vec<&str> = results.iter().map(|r| r.fields.title.as_str()).collect();
        assert_eq!(titles, vec!["two", "four", "one", "three"]);
    }

    #[test]
    fn test_repeated_candidate_never_double_counts() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let b = UserId::new();
        let tag = RotationTag::new("T");

        let encrypted = service
            .encrypt_expense(&b, &group, &tag, ExpenseId::new(), &fields("Lunch", 1999))
            .unwrap();

        let results = service
            .decrypt_expenses_for_candidates(&group, &[b, b, b], &[encrypted], &tag, &NeverCancelled)
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn test_malformed_record_is_skipped() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let b = UserId::new();
        let tag = RotationTag::new("T");

        let good = service
            .encrypt_expense(&b, &group, &tag, ExpenseId::new(), &fields("Good", 100))
            .unwrap();
        let mut broken = good.clone();
        broken.id = ExpenseId::new();
        broken.title = EncryptedField::new("not*base64*at*all");

        let results = service
            .decrypt_expenses_for_candidates(
                &group,
                &[UserId::new(), b],
                &[broken.clone(), good],
                &tag,
                &NeverCancelled,
            )
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].fields.title, "Good");

        let err = service
            .decrypt_expense(&b, &group, &tag, &broken, &NeverCancelled)
            .unwrap_err();
        assert!(err.is_malformed());
    }

    #[test]
    fn test_spliced_field_is_not_accepted() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let (a, b) = (UserId::new(), UserId::new());
        let tag = RotationTag::new("T");

        let mut record = service
            .encrypt_expense(&b, &group, &tag, ExpenseId::new(), &fields("Rent", 120000))
            .unwrap();
        let other = service
            .encrypt_expense(&a, &group, &tag, ExpenseId::new(), &fields("Rent", 1))
            .unwrap();
        record.amount = other.amount;

        let results = service
            .decrypt_expenses_for_candidates(&group, &[a, b], &[record.clone()], &tag, &NeverCancelled)
            .unwrap();
        assert!(results.is_empty());

        let err = service
            .decrypt_expense(&b, &group, &tag, &record, &NeverCancelled)
            .unwrap_err();
        assert!(err.is_authentication_failure());
    }

    #[test]
    fn test_cancellation_mid_batch_returns_nothing() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let candidates = [UserId::new(), UserId::new(), UserId::new()];
        let tag = RotationTag::new("T");

        let records: Vec<EncryptedExpense> = (0..4)
            .map(|i| {
                service
                    .encrypt_expense(&candidates[2], &group, &tag, ExpenseId::new(), &fields("x", i))
                    .unwrap()
            })
            .collect();

        for after in [0, 1, 3, 6] {
            let cancel = CancelAfter::new(after);
            let result =
                service.decrypt_expenses_for_candidates(&group, &candidates, &records, &tag, &cancel);
            assert!(matches!(result, Err(SplitError::Cancelled)), "after={}", after);
        }

        // Enough polls to finish: the full list comes back
        let cancel = CancelAfter::new(usize::MAX - 1);
        let results = service
            .decrypt_expenses_for_candidates(&group, &candidates, &records, &tag, &cancel)
            .unwrap();
        assert_eq!(results.len(), 4);
    }

    #[test]
    fn test_token_and_flag_sources() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        let user = UserId::new();
        let tag = RotationTag::new("T");
        let record = service
            .encrypt_expense(&user, &group, &tag, ExpenseId::new(), &fields("x", 1))
            .unwrap();

        let token = CancellationToken::new();
        token.cancel();
        let result =
            service.decrypt_expenses_for_candidates(&group, &[user], &[record.clone()], &tag, &token);
        assert!(matches!(result, Err(SplitError::Cancelled)));

        let flag = AtomicBool::new(true);
        let result = service.decrypt_expense(&user, &group, &tag, &record, &flag);
        assert!(matches!(result, Err(SplitError::Cancelled)));

        flag.store(false, Ordering::Release);
        assert!(service.decrypt_expense(&user, &group, &tag, &record, &flag).is_ok());
    }

    #[test]
    fn test_missing_group_key_fails_batch() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();

        let err = service
            .decrypt_expenses_for_candidates(
                &GroupId::new(),
                &[UserId::new()],
                &[],
                &RotationTag::new("T"),
                &NeverCancelled,
            )
            .unwrap_err();
        assert!(matches!(err, SplitError::KeyDerivation(_)));
    }

    #[test]
    fn test_empty_inputs() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let service = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();

        let results = service
            .decrypt_expenses_for_candidates(&group, &[], &[], &RotationTag::new("T"), &NeverCancelled)
            .unwrap();
        assert!(results.is_empty());
    }

    #[test]
    fn test_versioned_format_round_trip() {
        let (_temp, repo) = create_test_repo();
        let p = protector();
        let group = new_group(&repo, &p);
        let versioned = FieldCipher::new(FieldFormat::Versioned);
        let service = ExpenseCryptoService::new(&repo, &p, versioned, FAST).unwrap();
        let user = UserId::new();
        let tag = RotationTag::new("T");
        let original = fields("Museum", 2400);

        let record = service
            .encrypt_expense(&user, &group, &tag, ExpenseId::new(), &original)
            .unwrap();
        let results = service
            .decrypt_expenses_for_candidates(&group, &[user], &[record.clone()], &tag, &NeverCancelled)
            .unwrap();
        assert_eq!(results[0].fields, original);

        // Unversioned reader treats the leading byte as part of the nonce
        let plain = ExpenseCryptoService::new(&repo, &p, FieldCipher::default(), FAST).unwrap();
        assert!(plain
            .decrypt_expense(&user, &group, &tag, &record, &NeverCancelled)
            .is_err());
    }
}
