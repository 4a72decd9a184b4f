//! OpenAPI documentation
//!
//! Serves an OpenAPI 3.0 document and a Swagger UI page for the docgate API.

use axum::{
    response::{Html, IntoResponse},
    routing::get,
    Json, Router,
};
use serde_json::json;

/// Create OpenAPI routes
pub fn create_openapi_routes() -> Router {
    Router::new()
        .route("/openapi.json", get(openapi_json))
        .route("/docs", get(swagger_ui))
}

async fn openapi_json() -> impl IntoResponse {
    Json(get_openapi_spec())
}

async fn swagger_ui() -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

fn error_response(description: &str) -> serde_json::Value {
    json!({
        "description": description,
        "content": {
            "application/json": {
                "schema": {"$ref": "#/components/schemas/ErrorResponse"}
            }
        }
    })
}

/// Get the OpenAPI specification as JSON
fn get_openapi_spec() -> serde_json::Value {
    json!({
        "openapi": "3.0.3",
        "info": {
            "title": "docgate API",
            "description": "Multi-tenant document indexing and search gateway.\n\nEvery user owns exactly one search index. Documents are indexed asynchronously: submitting returns a job id to poll.\n\n## Authentication\n\nAll `/api/v1` endpoints require an API key.\n\n- **Header**: `X-API-Key: <your-api-key>`\n- **Bearer**: `Authorization: Bearer <your-api-key>`",
            "version": env!("CARGO_PKG_VERSION"),
            "license": {
                "name": "Apache-2.0",
                "url": "https://www.apache.org/licenses/LICENSE-2.0"
            }
        },
        "tags": [
            {"name": "health", "description": "Health check endpoints"},
            {"name": "documents", "description": "Document submission"},
            {"name": "jobs", "description": "Indexing job status"},
            {"name": "search", "description": "Search passthrough"}
        ],
        "paths": {
            "/health": {
                "get": {
                    "tags": ["health"],
                    "summary": "Basic health check",
                    "operationId": "health",
                    "responses": {
                        "200": {
                            "description": "Service is healthy",
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/HealthResponse"}
                                }
                            }
                        }
                    }
                }
            },
            "/health/live": {
                "get": {
                    "tags": ["health"],
                    "summary": "Liveness probe",
                    "operationId": "liveness",
                    "responses": {
                        "200": {"description": "Service is alive"}
                    }
                }
            },
            "/health/ready": {
                "get": {
                    "tags": ["health"],
                    "summary": "Readiness probe (broker and search engine)",
                    "operationId": "readiness",
                    "responses": {
                        "200": {"description": "Service is ready"},
                        "503": {"description": "A dependency is unavailable"}
                    }
                }
            },
            "/metrics": {
                "get": {
                    "tags": ["health"],
                    "summary": "Prometheus metrics",
                    "operationId": "metrics",
                    "responses": {
                        "200": {
                            "description": "Metrics in the Prometheus text format",
                            "content": {"text/plain": {"schema": {"type": "string"}}}
                        }
                    }
                }
            },
            "/api/v1/documents": {
                "post": {
                    "tags": ["documents"],
                    "summary": "Queue documents for indexing into the caller's index",
                    "operationId": "submitDocuments",
                    "security": [{"api_key": []}, {"bearer": []}],
                    "requestBody": {
                        "required": true,
                        "content": {
                            "application/json": {
                                "schema": {
                                    "type": "array",
                                    "items": {"type": "object", "additionalProperties": true}
                                }
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Job queued",
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/SubmitResponse"}
                                }
                            }
                        },
                        "400": error_response("Body is not a JSON array of objects"),
                        "401": error_response("Missing or invalid API key"),
                        "413": {"description": "Request body too large"}
                    }
                }
            },
            "/api/v1/jobs": {
                "get": {
                    "tags": ["jobs"],
                    "summary": "Get the status of one of the caller's jobs",
                    "operationId": "getJob",
                    "security": [{"api_key": []}, {"bearer": []}],
                    "parameters": [
                        {"name": "job_id", "in": "query", "required": true, "schema": {"type": "string"}}
                    ],
                    "responses": {
                        "200": {
                            "description": "Job status",
                            "content": {
                                "application/json": {
                                    "schema": {"$ref": "#/components/schemas/JobStatusResponse"}
                                }
                            }
                        },
                        "400": error_response("Missing job_id"),
                        "401": error_response("Missing or invalid API key"),
                        "404": error_response("No such job for this user")
                    }
                }
            },
            "/api/v1/search": {
                "post": {
                    "tags": ["search"],
                    "summary": "Run a search engine query against the caller's index",
                    "operationId": "search",
                    "security": [{"api_key": []}, {"bearer": []}],
                    "requestBody": {
                        "required": false,
                        "content": {
                            "application/json": {
                                "schema": {"type": "object", "additionalProperties": true}
                            }
                        }
                    },
                    "responses": {
                        "200": {
                            "description": "Search engine response, unmodified",
                            "content": {
                                "application/json": {
                                    "schema": {"type": "object", "additionalProperties": true}
                                }
                            }
                        },
                        "400": error_response("Body is not valid JSON"),
                        "401": error_response("Missing or invalid API key"),
                        "502": error_response("Search engine failure")
                    }
                }
            }
        },
        "components": {
            "securitySchemes": {
                "api_key": {
                    "type": "apiKey",
                    "in": "header",
                    "name": "X-API-Key"
                },
                "bearer": {
                    "type": "http",
                    "scheme": "bearer"
                }
            },
            "schemas": {
                "HealthResponse": {
                    "type": "object",
                    "properties": {
                        "status": {"type": "string", "example": "healthy"}
                    }
                },
                "ErrorResponse": {
                    "type": "object",
                    "properties": {
                        "error": {"type": "string", "example": "VALIDATION_ERROR"},
                        "message": {"type": "string"}
                    }
                },
                "SubmitResponse": {
                    "type": "object",
                    "properties": {
                        "job_id": {"type": "string", "format": "uuid"}
                    }
                },
                "JobStatusResponse": {
                    "type": "object",
                    "required": ["status", "result", "enqueued_at"],
                    "properties": {
                        "status": {
                            "type": "string",
                            "enum": ["queued", "started", "finished", "failed"]
                        },
                        "result": {
                            "type": "object",
                            "nullable": true,
                            "description": "Search engine bulk response once finished"
                        },
                        "error": {"type": "string", "description": "Failure detail when failed"},
                        "enqueued_at": {"type": "string", "format": "date-time"},
                        "started_at": {"type": "string", "format": "date-time"},
                        "ended_at": {"type": "string", "format": "date-time"}
                    }
                }
            }
        }
    })
}

/// Swagger UI HTML template
const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>docgate API Documentation</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            SwaggerUIBundle({ url: "/openapi.json", dom_id: '#swagger-ui' });
        };
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_api_route_is_documented() {
        let spec = get_openapi_spec();
        for path in ["/api/v1/documents", "/api/v1/jobs", "/api/v1/search", "/health/ready"] {
            assert!(spec["paths"][path].is_object(), "{} is undocumented", path);
        }
        assert_eq!(
            spec["components"]["schemas"]["JobStatusResponse"]["properties"]["status"]["enum"]
                .as_array()
                .unwrap()
                .len(),
            4
        );
    }
}
