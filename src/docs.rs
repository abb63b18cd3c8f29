use axum::Router;
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::authz::{Action, Subject};
use crate::models::user::User;
use crate::routes::{abilities, health, users};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        abilities::my_ability,
        abilities::check,
        users::list_users,
        users::get_user
    ),
    components(
        schemas(
            health::HealthResponse,
            abilities::AbilityResponse,
            abilities::RuleView,
            abilities::CheckRequest,
            abilities::CheckResponse,
            User,
            Action,
            Subject
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Health", description = "Liveness and permission store reachability"),
        (name = "Abilities", description = "Compiled capabilities of the caller"),
        (name = "Users", description = "User directory, filtered by ability")
    )
)]
pub struct ApiDoc;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn build_openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

/// Swagger UI at `/docs`, document at `/api-docs/openapi.json`.
pub fn swagger_routes() -> Router {
    SwaggerUi::new("/docs")
        .url("/api-docs/openapi.json", build_openapi())
        .into()
}
