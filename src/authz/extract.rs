//! Axum extractors that put the gate in front of handlers.
//!
//! Requirements are attached declaratively through a [`RequirementSet`]
//! type parameter:
//!
//! ```ignore
//! struct ReadReports;
//! impl RequirementSet for ReadReports {
//!     fn requirements() -> Vec<Requirement> {
//!         vec![Requirement::can(Action::Read, Subject::Report)]
//!     }
//! }
//!
//! async fn list(auth: Authorized<ReadReports>) -> ... { auth.ability ... }
//! ```

use std::marker::PhantomData;

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use super::ability::Ability;
use super::gate::{Decision, Requirement};
use super::principal::Principal;
use crate::app::AppState;
use crate::errors::AppError;
use crate::jwt::AuthUser;

/// The capability requirements of one operation.
pub trait RequirementSet: Send + Sync + 'static {
    fn requirements() -> Vec<Requirement>;
}

/// Passes only if every requirement of `R` holds for the caller.
///
/// The compiled ability is handed to the handler for instance filtering and
/// field projection.
pub struct Authorized<R> {
    pub principal: Principal,
    pub ability: Ability,
    _requirements: PhantomData<fn() -> R>,
}

#[async_trait]
impl<R: RequirementSet> FromRequestParts<AppState> for Authorized<R> {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = authenticated_principal(parts, state).await?;
        let requirements = R::requirements();

        let ability = match state.gate.authorize(&requirements, Some(&principal)).await {
            Decision::Allowed(ability) => ability,
            // No requirements: still compile so the handler can narrow its output.
            Decision::Public => state.gate.ability_for(&principal).await?,
            Decision::Denied(denial) => return Err(denial.into()),
        };

        Ok(Self {
            principal,
            ability,
            _requirements: PhantomData,
        })
    }
}

/// The caller's compiled ability, with no requirements checked.
pub struct CurrentAbility {
    pub principal: Principal,
    pub ability: Ability,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAbility {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let principal = authenticated_principal(parts, state).await?;
        let ability = state.gate.ability_for(&principal).await?;
        Ok(Self { principal, ability })
    }
}

async fn authenticated_principal(parts: &mut Parts, state: &AppState) -> Result<Principal, AppError> {
    let auth = AuthUser::from_request_parts(parts, state).await?;

    state
        .gate
        .find_principal(auth.user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("unknown user"))
}
