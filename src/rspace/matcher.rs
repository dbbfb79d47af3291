/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Matching data against bind patterns.

use crate::{
    accounting::{costs::MATCH_TERM_COST, CostAccounting, OutOfPhlogistonsError},
    types::term::{BindPattern, ListParWithRandom, Term, Var},
};

pub trait Match: Send {
    /// Match `data` against `pattern`. On success, returns the captured terms (in free variable order)
    /// together with the random state of `data`.
    fn get(
        &self,
        pattern: &BindPattern,
        data: &ListParWithRandom,
    ) -> Result<Option<ListParWithRandom>, OutOfPhlogistonsError>;
}

/// A structural matcher: `Free(i)` captures the value at its position into capture `i`, `Wildcard`
/// matches anything, lists and tuples are matched element-wise, and every other term must be equal.
///
/// Every term comparison is charged [`MATCH_TERM_COST`].
#[derive(Clone)]
pub struct FreeVarMatcher {
    cost: CostAccounting,
}

impl FreeVarMatcher {
    pub fn new(cost: CostAccounting) -> FreeVarMatcher {
        FreeVarMatcher { cost }
    }

    fn match_term(
        &self,
        pattern: &Term,
        value: &Term,
        captures: &mut [Term],
    ) -> Result<bool, OutOfPhlogistonsError> {
        self.cost.charge(MATCH_TERM_COST)?;
        match (pattern, value) {
            (Term::Var(Var::Free(index)), _) => match captures.get_mut(*index as usize) {
                Some(capture) => {
                    *capture = value.clone();
                    Ok(true)
                }
                None => Ok(false),
            },
            (Term::Var(Var::Wildcard), _) => Ok(true),
            (Term::List(patterns), Term::List(values)) | (Term::Tuple(patterns), Term::Tuple(values)) => {
                if patterns.len() != values.len() {
                    return Ok(false);
                }
                for (pattern, value) in patterns.iter().zip(values) {
                    if !self.match_term(pattern, value, captures)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(pattern == value),
        }
    }
}

impl Match for FreeVarMatcher {
    fn get(
        &self,
        pattern: &BindPattern,
        data: &ListParWithRandom,
    ) -> Result<Option<ListParWithRandom>, OutOfPhlogistonsError> {
        let arity = pattern.arity();
        if data.pars.len() < arity || (data.pars.len() > arity && pattern.remainder.is_none()) {
            return Ok(None);
        }

        let mut captures = vec![Term::Nil; pattern.free_count as usize];
        for (pattern, value) in pattern.patterns.iter().zip(&data.pars) {
            if !self.match_term(pattern, value, &mut captures)? {
                return Ok(None);
            }
        }

        if let Some(Var::Free(index)) = pattern.remainder {
            self.cost.charge(MATCH_TERM_COST)?;
            match captures.get_mut(index as usize) {
                Some(capture) => *capture = Term::List(data.pars[arity..].to_vec()),
                None => return Ok(None),
            }
        }

        Ok(Some(ListParWithRandom::new(
            captures,
            data.random_state.clone(),
        )))
    }
}
