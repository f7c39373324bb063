use chrono::{DateTime, Utc};
use hourglass_rs::SafeTimeProvider;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::access::{AccessController, SignatureVerifier};
use crate::config::LedgerConfig;
use crate::decimal::{Bps, FeeRate, Money};
use crate::errors::{LedgerError, Result};
use crate::events::{Event, EventLog};
use crate::index::PriceIndex;
use crate::interest::{amount_owed, AdjustmentEngine, RateAdjustment};
use crate::payments::{FundsTransfer, PaymentProcessor, PaymentReceipt, PaymentRequest};
use crate::state::{LedgerState, LoanRecord, LoanTerms, ServiceFeeConfig};
use crate::types::{Address, LoanId, LoanStatus};

/// the loan ledger and its state-transition engine
///
/// Owns every loan record, the service fee config and the event log. Each
/// public mutating operation is atomic: it either commits its state change
/// together with its events, or returns one error and leaves the ledger as it
/// was.
pub struct Ledger<P: PriceIndex> {
    config: LedgerConfig,
    access: AccessController,
    loans: BTreeMap<LoanId, LoanRecord>,
    fee_config: ServiceFeeConfig,
    events: EventLog,
    index: P,
    adjuster: AdjustmentEngine,
    processor: PaymentProcessor,
}

/// pre-operation copy of everything an operation may touch
struct Journal {
    loan: Option<(LoanId, Option<LoanRecord>)>,
    fee_config: ServiceFeeConfig,
    events_len: usize,
}

impl<P: PriceIndex> Ledger<P> {
    /// bootstrap a ledger from its configuration and index client
    pub fn new(config: LedgerConfig, index: P) -> Result<Self> {
        let access = AccessController::new(config.servicer, config.originator);
        Self::build(config, index, access)
    }

    /// same as `new` with a custom signature scheme
    pub fn with_verifier(
        config: LedgerConfig,
        index: P,
        verifier: Box<dyn SignatureVerifier>,
    ) -> Result<Self> {
        let access = AccessController::with_verifier(config.servicer, config.originator, verifier);
        Self::build(config, index, access)
    }

    fn build(config: LedgerConfig, index: P, access: AccessController) -> Result<Self> {
        config.validate()?;
        let fee_config = ServiceFeeConfig {
            service_fee_rate: config.service_fee_rate,
            msr_holder: config.initial_msr_holder(),
        };
        let processor = PaymentProcessor::new(config.policy.owed_amount);

        info!(
            ledger = %config.ledger_id.short(),
            servicer = %config.servicer.short(),
            originator = %config.originator.short(),
            "ledger initialised"
        );

        Ok(Self {
            config,
            access,
            loans: BTreeMap::new(),
            fee_config,
            events: EventLog::new(),
            index,
            adjuster: AdjustmentEngine::new(),
            processor,
        })
    }

    /// rebuild a ledger from an exported state
    ///
    /// The log chain, every loan record and the fee config are checked before
    /// anything is adopted.
    pub fn restore(config: LedgerConfig, state: LedgerState, index: P) -> Result<Self> {
        if let Some(sequence) = state.events.first_tampered() {
            return Err(LedgerError::InvalidConfiguration {
                message: format!("event log fails verification at entry {}", sequence),
            });
        }
        if let Some(ledger_id) = state.ledger_id {
            if ledger_id != config.ledger_id {
                return Err(LedgerError::InvalidConfiguration {
                    message: format!(
                        "state belongs to ledger {}, not {}",
                        ledger_id.short(),
                        config.ledger_id.short()
                    ),
                });
            }
        }
        for (key, record) in &state.loans {
            if *key != record.loan_id {
                return Err(LedgerError::InvalidConfiguration {
                    message: format!("loan stored under id {} claims id {}", key, record.loan_id),
                });
            }
            record.validate()?;
        }
        if let Some(fee_config) = &state.fee_config {
            if fee_config.msr_holder == Address::ZERO {
                return Err(LedgerError::InvalidConfiguration {
                    message: "msr holder must not be the zero address".to_string(),
                });
            }
        }

        let mut ledger = Self::new(config, index)?;
        if let Some(fee_config) = state.fee_config {
            ledger.fee_config = fee_config;
        }
        ledger.loans = state.loans;
        ledger.events = state.events;
        Ok(ledger)
    }

    /// snapshot of all owned state
    pub fn export_state(&self) -> LedgerState {
        LedgerState {
            ledger_id: Some(self.config.ledger_id),
            loans: self.loans.clone(),
            fee_config: Some(self.fee_config.clone()),
            events: self.events.clone(),
        }
    }

    // ----- loan ledger -----

    /// create a new loan record; servicer only
    pub fn originate_loan(
        &mut self,
        caller: &Address,
        loan_id: LoanId,
        terms: LoanTerms,
        time_provider: &SafeTimeProvider,
    ) -> Result<&LoanRecord> {
        self.access.require_servicer(caller)?;
        if self.loans.contains_key(&loan_id) {
            warn!(loan_id, "origination rejected: id already used");
            return Err(LedgerError::LoanAlreadyExists { loan_id });
        }
        terms.validate(loan_id)?;

        let now = time_provider.now();
        let document_hash = terms.document_hash.clone();
        let principal = terms.principal;

        self.atomically(Some(loan_id), |ledger| {
            ledger.loans.insert(loan_id, LoanRecord::new(loan_id, terms, now));
            ledger.events.append(
                Event::LoanOriginated {
                    loan_id,
                    document_hash,
                },
                now,
            );
            Ok(())
        })?;

        info!(loan_id, %principal, "loan originated");
        self.loan(loan_id)
    }

    /// read-only lookup
    pub fn loan(&self, loan_id: LoanId) -> Result<&LoanRecord> {
        self.loans
            .get(&loan_id)
            .ok_or(LedgerError::LoanNotFound { loan_id })
    }

    /// all loans in id order
    pub fn loans(&self) -> impl Iterator<Item = &LoanRecord> {
        self.loans.values()
    }

    pub fn loan_count(&self) -> usize {
        self.loans.len()
    }

    pub fn loan_status(&self, loan_id: LoanId) -> Result<LoanStatus> {
        Ok(self.loan(loan_id)?.status())
    }

    /// what `make_payment` currently requires for this loan
    pub fn amount_owed(&self, loan_id: LoanId) -> Result<Money> {
        amount_owed(self.loan(loan_id)?, self.config.policy.owed_amount)
    }

    pub fn rate_ceiling(&self, loan_id: LoanId) -> Result<Bps> {
        self.loan(loan_id)?.rate_ceiling()
    }

    // ----- interest rate adjuster -----

    /// reset the rate of a due loan from the price index; servicer only
    pub fn adjust_interest_rate(
        &mut self,
        caller: &Address,
        loan_id: LoanId,
        time_provider: &SafeTimeProvider,
    ) -> Result<RateAdjustment> {
        self.access.require_servicer(caller)?;
        let now = time_provider.now();

        let loan = self.loan(loan_id)?;
        if loan.is_paid && !self.config.policy.allow_adjustment_after_paid {
            return Err(LedgerError::LoanAlreadyPaid { loan_id });
        }
        if !loan.is_adjustment_due(now) {
            return Err(LedgerError::AdjustmentNotDue {
                loan_id,
                next_adjustment: loan.next_adjustment_date,
                now,
            });
        }

        // index read and commit happen within the same exclusive borrow
        let reading = self.index.read()?;
        let adjustment = self.adjuster.compute(loan, reading)?;

        self.atomically(Some(loan_id), |ledger| {
            ledger.apply_adjustment(
                loan_id,
                adjustment.new_rate,
                adjustment.next_adjustment_date,
                now,
            )?;
            ledger.events.append(
                Event::InterestRateAdjusted {
                    loan_id,
                    new_rate: adjustment.new_rate,
                },
                now,
            );
            Ok(())
        })?;

        info!(
            loan_id,
            new_rate = %adjustment.new_rate,
            capped = adjustment.was_capped(),
            next = %adjustment.next_adjustment_date,
            "interest rate adjusted"
        );
        Ok(adjustment)
    }

    // ----- payment processor -----

    /// settle a loan with an incoming payment
    ///
    /// The loan is marked paid and both events are appended before any value
    /// leaves the ledger. If the payout fails the whole payment is rolled back.
    pub fn make_payment(
        &mut self,
        request: PaymentRequest,
        transfer: &mut dyn FundsTransfer,
        time_provider: &SafeTimeProvider,
    ) -> Result<PaymentReceipt> {
        let PaymentRequest {
            loan_id,
            payer,
            amount,
        } = request;
        let now = time_provider.now();

        let loan = self.loan(loan_id)?;
        let owed = self.processor.validate(loan, amount)?;
        let split = self
            .processor
            .split(amount, self.fee_config.service_fee_rate)?;

        let receipt = PaymentReceipt {
            loan_id,
            payer,
            amount,
            owed,
            split,
            servicer: self.access.servicer(),
            msr_holder: self.fee_config.msr_holder,
            paid_at: now,
        };

        let result = self.atomically(Some(loan_id), |ledger| {
            ledger.apply_payment(loan_id, payer, amount, now)?;
            ledger.events.append(
                Event::PaymentReceived {
                    loan_id,
                    payer,
                    amount,
                },
                now,
            );
            ledger.events.append(
                Event::ServiceFeePaid {
                    loan_id,
                    fee_amount: split.fee,
                },
                now,
            );

            let committed = ledger.loan(loan_id)?;
            ledger.processor.disburse(committed, &receipt, transfer)
        });

        if let Err(err) = result {
            warn!(loan_id, error = %err, "payment rolled back");
            return Err(err);
        }

        info!(
            loan_id,
            payer = %payer.short(),
            %amount,
            fee = %split.fee,
            "payment settled"
        );
        Ok(receipt)
    }

    // ----- access controller -----

    /// change the service fee rate under an originator signature
    ///
    /// Anyone may submit; authorisation rests entirely on the signature.
    pub fn update_service_fee_rate(
        &mut self,
        new_rate: FeeRate,
        signature: &[u8],
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.access
            .verify_fee_rate_update(new_rate, signature, &self.config.ledger_id)?;
        let now = time_provider.now();

        self.atomically(None, |ledger| {
            ledger.fee_config.service_fee_rate = new_rate;
            ledger
                .events
                .append(Event::ServiceFeeRateUpdated { new_rate }, now);
            Ok(())
        })?;

        info!(rate = %new_rate, "service fee rate updated");
        Ok(())
    }

    /// hand the servicing rights to a new holder; current holder only
    pub fn set_msr_holder(
        &mut self,
        caller: &Address,
        new_holder: Address,
        time_provider: &SafeTimeProvider,
    ) -> Result<()> {
        self.access
            .require_msr_holder(caller, &self.fee_config.msr_holder)?;
        if new_holder == Address::ZERO {
            return Err(LedgerError::InvalidConfiguration {
                message: "msr holder must not be the zero address".to_string(),
            });
        }
        let now = time_provider.now();

        self.atomically(None, |ledger| {
            ledger.fee_config.msr_holder = new_holder;
            ledger
                .events
                .append(Event::MsrHolderChanged { new_holder }, now);
            Ok(())
        })?;

        info!(from = %caller.short(), to = %new_holder.short(), "msr holder changed");
        Ok(())
    }

    // ----- queries -----

    pub fn service_fee_rate(&self) -> FeeRate {
        self.fee_config.service_fee_rate
    }

    pub fn msr_holder(&self) -> Address {
        self.fee_config.msr_holder
    }

    pub fn servicer(&self) -> Address {
        self.access.servicer()
    }

    pub fn originator(&self) -> Address {
        self.access.originator()
    }

    pub fn ledger_id(&self) -> Address {
        self.config.ledger_id
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn events(&self) -> &EventLog {
        &self.events
    }

    pub fn price_index(&self) -> &P {
        &self.index
    }

    /// index client access, e.g. to publish values on a mock
    pub fn price_index_mut(&mut self) -> &mut P {
        &mut self.index
    }

    // ----- commit primitives -----

    fn apply_adjustment(
        &mut self,
        loan_id: LoanId,
        new_rate: Bps,
        next_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(LedgerError::LoanNotFound { loan_id })?;
        loan.record_adjustment(new_rate, next_date, now);
        Ok(())
    }

    fn apply_payment(
        &mut self,
        loan_id: LoanId,
        payer: Address,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let loan = self
            .loans
            .get_mut(&loan_id)
            .ok_or(LedgerError::LoanNotFound { loan_id })?;
        if loan.is_paid {
            return Err(LedgerError::LoanAlreadyPaid { loan_id });
        }
        loan.record_payment(payer, amount, now);
        Ok(())
    }

    /// run `op`, restoring the touched loan, fee config and log on error
    fn atomically<T>(
        &mut self,
        loan_id: Option<LoanId>,
        op: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        let journal = Journal {
            loan: loan_id.map(|id| (id, self.loans.get(&id).cloned())),
            fee_config: self.fee_config.clone(),
            events_len: self.events.len(),
        };

        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.rollback(journal);
                Err(err)
            }
        }
    }

    fn rollback(&mut self, journal: Journal) {
        if let Some((loan_id, previous)) = journal.loan {
            match previous {
                Some(record) => {
                    self.loans.insert(loan_id, record);
                }
                None => {
                    self.loans.remove(&loan_id);
                }
            }
        }
        self.fee_config = journal.fee_config;
        self.events.truncate(journal.events_len);
    }
}

impl<P: PriceIndex> std::fmt::Debug for Ledger<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("ledger_id", &self.config.ledger_id)
            .field("loans", &self.loans.len())
            .field("fee_config", &self.fee_config)
            .field("events", &self.events.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::sign_fee_rate_update;
    use crate::config::{LedgerPolicy, OwedAmountPolicy};
    use crate::index::MockPriceIndex;
    use crate::payments::InMemoryTreasury;
    use crate::types::Role;
    use chrono::{Duration, TimeZone};
    use ed25519_dalek::SigningKey;
    use hourglass_rs::TimeSource;
    use rand::rngs::OsRng;

    const YEAR_SECS: u64 = 365 * 24 * 60 * 60;

    struct Parties {
        servicer: Address,
        originator_key: SigningKey,
        originator: Address,
        msr_holder: Address,
        borrower: Address,
        ledger_id: Address,
    }

    fn parties() -> Parties {
        let originator_key = SigningKey::generate(&mut OsRng);
        let originator = Address::from_verifying_key(&originator_key.verifying_key());
        Parties {
            servicer: Address::from_bytes([1u8; 32]),
            originator_key,
            originator,
            msr_holder: Address::from_bytes([3u8; 32]),
            borrower: Address::from_bytes([4u8; 32]),
            ledger_id: Address::from_bytes([0xAA; 32]),
        }
    }

    fn test_time() -> SafeTimeProvider {
        SafeTimeProvider::new(TimeSource::Test(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        ))
    }

    fn ledger_with(p: &Parties, policy: LedgerPolicy) -> Ledger<MockPriceIndex> {
        let config = LedgerConfig::new(p.ledger_id, p.servicer, p.originator)
            .with_msr_holder(p.msr_holder)
            .with_service_fee_rate(FeeRate::from_bps(100).unwrap())
            .with_policy(policy);
        Ledger::new(config, MockPriceIndex::new(2500, 3000)).unwrap()
    }

    fn ledger(p: &Parties) -> Ledger<MockPriceIndex> {
        ledger_with(p, LedgerPolicy::default())
    }

    fn terms(time: &SafeTimeProvider, lifetime_cap: u32) -> LoanTerms {
        LoanTerms {
            document_hash: "QmTest001".to_string(),
            principal: Money::from_minor(100_000),
            initial_rate: Bps::new(200),
            margin: Bps::new(50),
            lifetime_cap: Bps::new(lifetime_cap),
            first_adjustment_date: time.now() + Duration::days(30),
            adjustment_interval_secs: YEAR_SECS,
        }
    }

    fn pay(loan_id: LoanId, payer: Address, amount: u128) -> PaymentRequest {
        PaymentRequest {
            loan_id,
            payer,
            amount: Money::from_minor(amount),
        }
    }

    #[test]
    fn test_originate_loan() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);

        let loan = ledger
            .originate_loan(&p.servicer, 1, terms(&time, 1000), &time)
            .unwrap();
        assert_eq!(loan.principal_amount, Money::from_minor(100_000));
        assert_eq!(loan.initial_interest_rate, Bps::new(200));
        assert_eq!(loan.adjusted_interest_rate, Bps::new(200));
        assert_eq!(loan.margin, Bps::new(50));
        assert_eq!(loan.lifetime_cap, Bps::new(1000));
        assert_eq!(loan.next_adjustment_date, time.now() + Duration::days(30));
        assert!(!loan.is_paid);

        let events: Vec<_> = ledger.events().events().cloned().collect();
        assert_eq!(
            events,
            vec![Event::LoanOriginated {
                loan_id: 1,
                document_hash: "QmTest001".to_string()
            }]
        );
    }

    #[test]
    fn test_duplicate_origination_leaves_first_record() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        let mut other = terms(&time, 1000);
        other.principal = Money::from_minor(5);
        other.document_hash = "QmOther".to_string();
        assert_eq!(
            ledger.originate_loan(&p.servicer, 1, other, &time).unwrap_err(),
            LedgerError::LoanAlreadyExists { loan_id: 1 }
        );

        let loan = ledger.loan(1).unwrap();
        assert_eq!(loan.principal_amount, Money::from_minor(100_000));
        assert_eq!(loan.document_hash, "QmTest001");
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn test_origination_restricted_to_servicer() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);

        assert_eq!(
            ledger.originate_loan(&p.borrower, 1, terms(&time, 1000), &time).unwrap_err(),
            LedgerError::Unauthorized { caller: p.borrower, required: Role::Servicer }
        );
        assert_eq!(ledger.loan_count(), 0);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_invalid_terms_rejected() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);

        assert!(matches!(
            ledger.originate_loan(&p.servicer, 0, terms(&time, 1000), &time),
            Err(LedgerError::InvalidLoanTerms { .. })
        ));
        assert_eq!(ledger.loan_count(), 0);
    }

    #[test]
    fn test_get_missing_loan() {
        let p = parties();
        let ledger = ledger(&p);
        assert_eq!(ledger.loan(42).unwrap_err(), LedgerError::LoanNotFound { loan_id: 42 });
        assert!(ledger.amount_owed(42).is_err());
    }

    #[test]
    fn test_adjust_within_cap() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 2500), &time).unwrap();

        control.advance(Duration::seconds(YEAR_SECS as i64));
        let adjustment = ledger.adjust_interest_rate(&p.servicer, 1, &time).unwrap();

        // 200 + 50 + ((3000 - 2500) * 10000) / 2500
        assert_eq!(adjustment.new_rate, Bps::new(2250));
        let loan = ledger.loan(1).unwrap();
        assert_eq!(loan.adjusted_interest_rate, Bps::new(2250));
        assert_eq!(loan.status(), LoanStatus::RateAdjusted);
        assert_eq!(
            ledger.events().events().last(),
            Some(&Event::InterestRateAdjusted { loan_id: 1, new_rate: Bps::new(2250) })
        );
    }

    #[test]
    fn test_adjust_respects_lifetime_cap() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        control.advance(Duration::seconds(YEAR_SECS as i64));
        let adjustment = ledger.adjust_interest_rate(&p.servicer, 1, &time).unwrap();

        assert_eq!(adjustment.candidate_rate, 2250);
        assert_eq!(ledger.loan(1).unwrap().adjusted_interest_rate, Bps::new(1200));
    }

    #[test]
    fn test_adjust_not_due() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        control.advance(Duration::days(29));
        assert!(matches!(
            ledger.adjust_interest_rate(&p.servicer, 1, &time),
            Err(LedgerError::AdjustmentNotDue { loan_id: 1, .. })
        ));
        assert_eq!(ledger.loan(1).unwrap().adjusted_interest_rate, Bps::new(200));
        assert_eq!(ledger.events().len(), 1);
    }

    #[test]
    fn test_adjust_once_per_interval() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        let first_date = ledger.loan(1).unwrap().next_adjustment_date;

        control.advance(Duration::days(30));
        ledger.adjust_interest_rate(&p.servicer, 1, &time).unwrap();
        let second_date = ledger.loan(1).unwrap().next_adjustment_date;
        assert_eq!(second_date - first_date, Duration::seconds(YEAR_SECS as i64));

        // same instant: the window has moved on
        assert!(matches!(
            ledger.adjust_interest_rate(&p.servicer, 1, &time),
            Err(LedgerError::AdjustmentNotDue { .. })
        ));

        control.advance(Duration::seconds(YEAR_SECS as i64));
        ledger.adjust_interest_rate(&p.servicer, 1, &time).unwrap();
        let loan = ledger.loan(1).unwrap();
        assert_eq!(loan.next_adjustment_date - second_date, Duration::seconds(YEAR_SECS as i64));
        assert_eq!(loan.adjustment_count, 2);
    }

    #[test]
    fn test_catch_up_one_interval_per_call() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        // three windows elapsed
        control.advance(Duration::days(30) + Duration::seconds(2 * YEAR_SECS as i64));
        for _ in 0..3 {
            ledger.adjust_interest_rate(&p.servicer, 1, &time).unwrap();
        }
        assert!(ledger.adjust_interest_rate(&p.servicer, 1, &time).is_err());
        assert_eq!(ledger.loan(1).unwrap().adjustment_count, 3);
    }

    #[test]
    fn test_rate_never_exceeds_ceiling_as_index_moves() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        control.advance(Duration::days(30));

        for current in [2500u64, 2600, 4000, 10_000, 1000, 2400, 50_000] {
            ledger.price_index_mut().set_current(current);
            ledger.adjust_interest_rate(&p.servicer, 1, &time).unwrap();
            let loan = ledger.loan(1).unwrap();
            assert!(loan.adjusted_interest_rate <= loan.rate_ceiling().unwrap());
            assert!(loan.adjusted_interest_rate >= Bps::new(250));
            control.advance(Duration::seconds(YEAR_SECS as i64));
        }
    }

    #[test]
    fn test_adjust_restricted_to_servicer() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        control.advance(Duration::days(30));

        assert!(matches!(
            ledger.adjust_interest_rate(&p.msr_holder, 1, &time),
            Err(LedgerError::Unauthorized { .. })
        ));
        assert_eq!(
            ledger.adjust_interest_rate(&p.servicer, 7, &time).unwrap_err(),
            LedgerError::LoanNotFound { loan_id: 7 }
        );
    }

    #[test]
    fn test_adjust_with_broken_index_changes_nothing() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        control.advance(Duration::days(30));

        ledger.price_index_mut().set_base(0);
        assert!(matches!(
            ledger.adjust_interest_rate(&p.servicer, 1, &time),
            Err(LedgerError::InvalidIndex { .. })
        ));
        assert_eq!(ledger.loan(1).unwrap().adjustment_count, 0);
    }

    #[test]
    fn test_make_payment() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        let amount = 110 * 10u128.pow(18);
        let receipt = ledger
            .make_payment(pay(1, p.borrower, amount), &mut treasury, &time)
            .unwrap();

        assert!(ledger.loan(1).unwrap().is_paid);
        assert_eq!(ledger.loan_status(1).unwrap(), LoanStatus::Paid);

        let tail: Vec<_> = ledger.events().events().skip(1).cloned().collect();
        assert_eq!(
            tail,
            vec![
                Event::PaymentReceived { loan_id: 1, payer: p.borrower, amount: Money::from_minor(amount) },
                Event::ServiceFeePaid { loan_id: 1, fee_amount: receipt.split.fee },
            ]
        );

        // 1% to the servicer, rest to the holder
        assert_eq!(treasury.balance_of(&p.servicer), Money::from_minor(11 * 10u128.pow(17)));
        assert_eq!(treasury.balance_of(&p.msr_holder), Money::from_minor(1089 * 10u128.pow(17)));
        assert_eq!(receipt.split.total().unwrap(), Money::from_minor(amount));
    }

    #[test]
    fn test_second_payment_rejected_without_transfer() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        ledger.make_payment(pay(1, p.borrower, 102_000), &mut treasury, &time).unwrap();
        let transfers_after_first = treasury.transfers().len();
        let events_after_first = ledger.events().len();

        assert_eq!(
            ledger.make_payment(pay(1, p.borrower, 102_000), &mut treasury, &time).unwrap_err(),
            LedgerError::LoanAlreadyPaid { loan_id: 1 }
        );
        assert_eq!(treasury.transfers().len(), transfers_after_first);
        assert_eq!(ledger.events().len(), events_after_first);
    }

    #[test]
    fn test_insufficient_payment() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        assert_eq!(ledger.amount_owed(1).unwrap(), Money::from_minor(102_000));
        assert_eq!(
            ledger.make_payment(pay(1, p.borrower, 101_999), &mut treasury, &time).unwrap_err(),
            LedgerError::InsufficientPayment {
                loan_id: 1,
                owed: Money::from_minor(102_000),
                provided: Money::from_minor(101_999),
            }
        );
        assert!(!ledger.loan(1).unwrap().is_paid);
        assert!(treasury.transfers().is_empty());
    }

    #[test]
    fn test_principal_only_policy() {
        let p = parties();
        let time = test_time();
        let policy = LedgerPolicy {
            owed_amount: OwedAmountPolicy::PrincipalOnly,
            allow_adjustment_after_paid: false,
        };
        let mut ledger = ledger_with(&p, policy);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        assert_eq!(ledger.amount_owed(1).unwrap(), Money::from_minor(100_000));
        assert!(ledger.make_payment(pay(1, p.borrower, 100_000), &mut treasury, &time).is_ok());
    }

    #[test]
    fn test_payment_missing_loan() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let mut treasury = InMemoryTreasury::new();
        assert_eq!(
            ledger.make_payment(pay(9, p.borrower, 1), &mut treasury, &time).unwrap_err(),
            LedgerError::LoanNotFound { loan_id: 9 }
        );
    }

    #[test]
    fn test_failed_payout_rolls_back_payment() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        let head = ledger.events().latest_hash();

        treasury.reject_transfers_to(p.msr_holder);
        assert!(matches!(
            ledger.make_payment(pay(1, p.borrower, 200_000), &mut treasury, &time),
            Err(LedgerError::TransferFailed { .. })
        ));

        let loan = ledger.loan(1).unwrap();
        assert!(!loan.is_paid);
        assert_eq!(loan.paid_by, None);
        assert_eq!(ledger.events().len(), 1);
        assert_eq!(ledger.events().latest_hash(), head);
        assert_eq!(treasury.balance_of(&p.servicer), Money::ZERO);

        // retry once the holder accepts value again
        treasury.accept_transfers_to(&p.msr_holder);
        assert!(ledger.make_payment(pay(1, p.borrower, 200_000), &mut treasury, &time).is_ok());
        assert!(ledger.events().verify_chain());
    }

    #[test]
    fn test_payout_goes_to_current_holder() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        let new_holder = Address::from_bytes([7u8; 32]);
        ledger.set_msr_holder(&p.msr_holder, new_holder, &time).unwrap();
        ledger.make_payment(pay(1, p.borrower, 102_000), &mut treasury, &time).unwrap();

        assert_eq!(treasury.balance_of(&p.msr_holder), Money::ZERO);
        assert_eq!(treasury.balance_of(&new_holder), Money::from_minor(102_000 - 1_020));
    }

    #[test]
    fn test_no_adjustment_after_paid_by_default() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let mut ledger = ledger(&p);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        ledger.make_payment(pay(1, p.borrower, 102_000), &mut treasury, &time).unwrap();

        control.advance(Duration::days(30));
        assert_eq!(
            ledger.adjust_interest_rate(&p.servicer, 1, &time).unwrap_err(),
            LedgerError::LoanAlreadyPaid { loan_id: 1 }
        );
    }

    #[test]
    fn test_adjustment_after_paid_when_allowed() {
        let p = parties();
        let time = test_time();
        let control = time.test_control().unwrap();
        let policy = LedgerPolicy {
            owed_amount: OwedAmountPolicy::PrincipalPlusInterest,
            allow_adjustment_after_paid: true,
        };
        let mut ledger = ledger_with(&p, policy);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        ledger.make_payment(pay(1, p.borrower, 102_000), &mut treasury, &time).unwrap();

        control.advance(Duration::days(30));
        ledger.adjust_interest_rate(&p.servicer, 1, &time).unwrap();
        let loan = ledger.loan(1).unwrap();
        assert!(loan.is_paid);
        assert_eq!(loan.status(), LoanStatus::Paid);
        assert_eq!(loan.adjusted_interest_rate, Bps::new(1200));
    }

    #[test]
    fn test_update_service_fee_rate_with_originator_signature() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let new_rate = FeeRate::new(10u128.pow(16)).unwrap();
        let sig = sign_fee_rate_update(&p.originator_key, new_rate, &p.ledger_id);

        ledger.update_service_fee_rate(new_rate, &sig, &time).unwrap();
        assert_eq!(ledger.service_fee_rate(), new_rate);
        assert_eq!(
            ledger.events().events().last(),
            Some(&Event::ServiceFeeRateUpdated { new_rate })
        );
    }

    #[test]
    fn test_update_service_fee_rate_rejects_foreign_signature() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let before = ledger.service_fee_rate();
        let new_rate = FeeRate::from_bps(500).unwrap();

        let impostor = SigningKey::generate(&mut OsRng);
        let sig = sign_fee_rate_update(&impostor, new_rate, &p.ledger_id);
        assert_eq!(
            ledger.update_service_fee_rate(new_rate, &sig, &time).unwrap_err(),
            LedgerError::InvalidSignature
        );

        // right key, signed for a different ledger
        let sig = sign_fee_rate_update(&p.originator_key, new_rate, &Address::from_bytes([0xBB; 32]));
        assert!(ledger.update_service_fee_rate(new_rate, &sig, &time).is_err());

        assert_eq!(ledger.service_fee_rate(), before);
        assert!(ledger.events().is_empty());
    }

    #[test]
    fn test_set_msr_holder() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);

        ledger.set_msr_holder(&p.msr_holder, p.borrower, &time).unwrap();
        assert_eq!(ledger.msr_holder(), p.borrower);
        assert_eq!(
            ledger.events().events().last(),
            Some(&Event::MsrHolderChanged { new_holder: p.borrower })
        );

        // the previous holder no longer has the right
        assert_eq!(
            ledger.set_msr_holder(&p.msr_holder, p.msr_holder, &time).unwrap_err(),
            LedgerError::Unauthorized { caller: p.msr_holder, required: Role::MsrHolder }
        );
        assert!(ledger.set_msr_holder(&p.servicer, p.servicer, &time).is_err());
        assert!(matches!(
            ledger.set_msr_holder(&p.borrower, Address::ZERO, &time),
            Err(LedgerError::InvalidConfiguration { .. })
        ));
        assert_eq!(ledger.msr_holder(), p.borrower);
    }

    #[test]
    fn test_export_and_restore() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        let mut treasury = InMemoryTreasury::new();
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        ledger.originate_loan(&p.servicer, 2, terms(&time, 1000), &time).unwrap();
        ledger.make_payment(pay(2, p.borrower, 102_000), &mut treasury, &time).unwrap();

        let json = serde_json::to_string(&ledger.export_state()).unwrap();
        let state: LedgerState = serde_json::from_str(&json).unwrap();
        let restored = Ledger::restore(ledger.config().clone(), state, MockPriceIndex::new(2500, 3000)).unwrap();

        assert_eq!(restored.loan(1).unwrap(), ledger.loan(1).unwrap());
        assert!(restored.loan(2).unwrap().is_paid);
        assert_eq!(restored.msr_holder(), ledger.msr_holder());
        assert_eq!(restored.events().latest_hash(), ledger.events().latest_hash());
    }

    #[test]
    fn test_restore_rejects_tampered_log() {
        let p = parties();
        let time = test_time();
        let mut ledger = ledger(&p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();

        let mut value = serde_json::to_value(ledger.export_state()).unwrap();
        value["events"]["entries"][0]["event"]["LoanOriginated"]["document_hash"] =
            serde_json::Value::String("QmForged".to_string());
        let state: LedgerState = serde_json::from_value(value).unwrap();

        assert!(matches!(
            Ledger::restore(ledger.config().clone(), state, MockPriceIndex::new(2500, 3000)),
            Err(LedgerError::InvalidConfiguration { .. })
        ));
    }

    fn exported_with_loan(p: &Parties) -> (Ledger<MockPriceIndex>, serde_json::Value) {
        let time = test_time();
        let mut ledger = ledger(p);
        ledger.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap();
        let value = serde_json::to_value(ledger.export_state()).unwrap();
        (ledger, value)
    }

    fn restore_value(
        ledger: &Ledger<MockPriceIndex>,
        value: serde_json::Value,
    ) -> Result<Ledger<MockPriceIndex>> {
        let state: LedgerState = serde_json::from_value(value).unwrap();
        Ledger::restore(ledger.config().clone(), state, MockPriceIndex::new(2500, 3000))
    }

    #[test]
    fn test_restore_rejects_rate_above_ceiling() {
        let p = parties();
        let (ledger, mut value) = exported_with_loan(&p);
        value["loans"]["1"]["adjusted_interest_rate"] = serde_json::json!(9000);

        assert!(matches!(
            restore_value(&ledger, value),
            Err(LedgerError::InvalidLoanTerms { .. })
        ));
    }

    #[test]
    fn test_restore_rejects_rekeyed_loan() {
        let p = parties();
        let (ledger, mut value) = exported_with_loan(&p);
        let record = value["loans"]["1"].take();
        let loans = value["loans"].as_object_mut().unwrap();
        loans.remove("1");
        loans.insert("2".to_string(), record);

        assert!(matches!(
            restore_value(&ledger, value),
            Err(LedgerError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_restore_rejects_zero_interval() {
        let p = parties();
        let (ledger, mut value) = exported_with_loan(&p);
        value["loans"]["1"]["adjustment_interval_secs"] = serde_json::json!(0);

        assert!(matches!(
            restore_value(&ledger, value),
            Err(LedgerError::InvalidLoanTerms { .. })
        ));
    }

    #[test]
    fn test_restore_rejects_zero_msr_holder() {
        let p = parties();
        let (ledger, mut value) = exported_with_loan(&p);
        value["fee_config"]["msr_holder"] = serde_json::to_value(Address::ZERO).unwrap();

        assert!(matches!(
            restore_value(&ledger, value),
            Err(LedgerError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_restore_rejects_foreign_ledger_state() {
        let p = parties();
        let (ledger, value) = exported_with_loan(&p);
        let state: LedgerState = serde_json::from_value(value).unwrap();
        let other = LedgerConfig::new(Address::from_bytes([0xBB; 32]), p.servicer, p.originator);

        assert!(matches!(
            Ledger::restore(other, state, MockPriceIndex::new(2500, 3000)),
            Err(LedgerError::InvalidConfiguration { .. })
        ));
    }

    #[test]
    fn test_restored_ids_stay_unique() {
        let p = parties();
        let time = test_time();
        let (ledger, value) = exported_with_loan(&p);
        let mut restored = restore_value(&ledger, value).unwrap();

        assert_eq!(
            restored.originate_loan(&p.servicer, 1, terms(&time, 1000), &time).unwrap_err(),
            LedgerError::LoanAlreadyExists { loan_id: 1 }
        );
    }
}
