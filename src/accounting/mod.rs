/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Phlogiston accounting: the budget every tuple-space operation is metered against.
//!
//! A single [`CostAccounting`] handle is shared by a space's [matcher](crate::rspace::matcher), its
//! [`ChargingSpace`](charging_space::ChargingSpace) wrapper, and the
//! [reducer](crate::interpreter::reduce::Reducer) driving it. Each charge subtracts from the remaining
//! budget; a charge larger than what remains fails with [`OutOfPhlogistonsError`] and leaves the budget
//! at zero.
//!
//! Trusted startup work (installing system processes, seeding the registry) runs under
//! [`Cost::unsafe_max`] via [`CostAccounting::with_budget`], which restores the previous budget afterwards.

use std::{
    fmt::{self, Display, Formatter},
    ops::{Add, Sub},
    sync::{Arc, Mutex},
};

use borsh::{BorshDeserialize, BorshSerialize};

pub mod charging_space;

pub mod costs;

/// An amount of phlogiston.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, BorshSerialize, BorshDeserialize)]
pub struct Cost(i64);

impl Cost {
    pub const fn new(int: i64) -> Cost {
        Cost(int)
    }

    pub const fn int(&self) -> i64 {
        self.0
    }

    /// The effectively unlimited budget used for trusted startup work.
    pub const fn unsafe_max() -> Cost {
        Cost(i32::MAX as i64)
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        Cost(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Cost {
    type Output = Cost;

    fn sub(self, rhs: Cost) -> Cost {
        Cost(self.0.saturating_sub(rhs.0))
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A charge of `requested` was attempted when only `remaining` was left.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutOfPhlogistonsError {
    pub requested: Cost,
    pub remaining: Cost,
}

impl Display for OutOfPhlogistonsError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Computation ran out of phlogistons (requested {}, remaining {})",
            self.requested, self.remaining
        )
    }
}

impl std::error::Error for OutOfPhlogistonsError {}

/// A shared, mutable phlogiston budget. Clones refer to the same budget.
#[derive(Clone, Debug)]
pub struct CostAccounting(Arc<Mutex<Cost>>);

impl CostAccounting {
    pub fn new(initial: Cost) -> CostAccounting {
        CostAccounting(Arc::new(Mutex::new(initial)))
    }

    /// Get the remaining budget.
    pub fn get(&self) -> Cost {
        *self.0.lock().unwrap()
    }

    pub fn set(&self, budget: Cost) {
        *self.0.lock().unwrap() = budget;
    }

    /// Subtract `amount` from the remaining budget. If `amount` exceeds the remaining budget, the budget
    /// is exhausted and an error is returned.
    pub fn charge(&self, amount: Cost) -> Result<(), OutOfPhlogistonsError> {
        let mut remaining = self.0.lock().unwrap();
        if amount > *remaining {
            let err = OutOfPhlogistonsError {
                requested: amount,
                remaining: *remaining,
            };
            *remaining = Cost::new(0);
            return Err(err);
        }
        *remaining = *remaining - amount;
        Ok(())
    }

    pub fn refund(&self, amount: Cost) {
        let mut remaining = self.0.lock().unwrap();
        *remaining = *remaining + amount;
    }

    /// Run `f` with the remaining budget temporarily set to `budget`, then restore the budget that was
    /// remaining before the call.
    pub fn with_budget<T>(&self, budget: Cost, f: impl FnOnce() -> T) -> T {
        let previous = self.get();
        self.set(budget);
        let result = f();
        self.set(previous);
        result
    }
}

impl Default for CostAccounting {
    fn default() -> Self {
        CostAccounting::new(Cost::default())
    }
}
