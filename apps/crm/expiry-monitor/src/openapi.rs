use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(axum_helpers::ErrorResponse)
    ),
    info(
        title = "Expiry Monitor API",
        version = "0.1.0",
        description = "Domain and hosting expiry reminders for CRM clients"
    ),
    servers(
        (url = "/api", description = "API base path")
    )
)]
struct BaseDoc;

/// Service document: the shared base plus the expiry routes
pub struct ApiDoc;

impl OpenApi for ApiDoc {
    fn openapi() -> utoipa::openapi::OpenApi {
        let mut doc = BaseDoc::openapi();
        doc.merge(domain_expiry::handlers::ApiDoc::openapi());
        doc
    }
}
