//! # API Endpoints
//!
//! Request descriptors for every gateway route the clients call. Pass them
//! to [`OfflineClient::request`](crate::OfflineClient::request).
//!
//! ```text
//! users          /users/register  /users/login  /users/profile
//! surveys        /surveys[/{id}[/publish]]  /surveys/templates
//! responses      /responses  /responses/partial
//! analytics      /analytics/surveys/{id}  /analytics/questions/{id}
//!                /analytics/reports/custom  /analytics/export
//!                /analytics/dashboard
//! notifications  /notifications/invite  /notifications/settings
//! ```

use serde_json::Value;
use survey_core::{HttpMethod, RequestDescriptor};

fn with_optional_params(descriptor: RequestDescriptor, params: Option<Value>) -> RequestDescriptor {
    match params {
        Some(params) => descriptor.with_params(params),
        None => descriptor,
    }
}

fn post(url: impl Into<String>, data: Value) -> RequestDescriptor {
    RequestDescriptor::new(HttpMethod::Post, url).with_data(data)
}

fn put(url: impl Into<String>, data: Value) -> RequestDescriptor {
    RequestDescriptor::new(HttpMethod::Put, url).with_data(data)
}

/// User service.
pub mod users {
    use super::*;

    pub fn register(user: Value) -> RequestDescriptor {
        post("/users/register", user)
    }

    pub fn login(credentials: Value) -> RequestDescriptor {
        post("/users/login", credentials)
    }

    pub fn profile() -> RequestDescriptor {
        RequestDescriptor::get("/users/profile")
    }

    pub fn update_profile(data: Value) -> RequestDescriptor {
        put("/users/profile", data)
    }
}

/// Survey service.
pub mod surveys {
    use super::*;

    pub fn create(survey: Value) -> RequestDescriptor {
        post("/surveys", survey)
    }

    pub fn list(params: Option<Value>) -> RequestDescriptor {
        with_optional_params(RequestDescriptor::get("/surveys"), params)
    }

    pub fn by_id(survey_id: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("/surveys/{}", survey_id))
    }

    pub fn update(survey_id: &str, data: Value) -> RequestDescriptor {
        put(format!("/surveys/{}", survey_id), data)
    }

    pub fn delete(survey_id: &str) -> RequestDescriptor {
        RequestDescriptor::new(HttpMethod::Delete, format!("/surveys/{}", survey_id))
    }

    pub fn publish(survey_id: &str) -> RequestDescriptor {
        RequestDescriptor::new(HttpMethod::Post, format!("/surveys/{}/publish", survey_id))
    }

    pub fn templates(params: Option<Value>) -> RequestDescriptor {
        with_optional_params(RequestDescriptor::get("/surveys/templates"), params)
    }
}

/// Response service. Submissions are the writes most often made offline.
pub mod responses {
    use super::*;

    pub fn submit(response: Value) -> RequestDescriptor {
        post("/responses", response)
    }

    pub fn save_partial(response: Value) -> RequestDescriptor {
        post("/responses/partial", response)
    }

    pub fn list(params: Option<Value>) -> RequestDescriptor {
        with_optional_params(RequestDescriptor::get("/responses"), params)
    }
}

/// Analytics service.
pub mod analytics {
    use super::*;

    pub fn survey(survey_id: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("/analytics/surveys/{}", survey_id))
    }

    pub fn question(question_id: &str) -> RequestDescriptor {
        RequestDescriptor::get(format!("/analytics/questions/{}", question_id))
    }

    pub fn custom_report(report: Value) -> RequestDescriptor {
        post("/analytics/reports/custom", report)
    }

    pub fn export(config: Value) -> RequestDescriptor {
        post("/analytics/export", config)
    }

    pub fn dashboard() -> RequestDescriptor {
        RequestDescriptor::get("/analytics/dashboard")
    }
}

/// Notification service.
pub mod notifications {
    use super::*;

    pub fn invite(invitation: Value) -> RequestDescriptor {
        post("/notifications/invite", invitation)
    }

    pub fn settings() -> RequestDescriptor {
        RequestDescriptor::get("/notifications/settings")
    }

    pub fn update_settings(settings: Value) -> RequestDescriptor {
        put("/notifications/settings", settings)
    }
}
