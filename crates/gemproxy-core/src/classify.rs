use http::Method;

use crate::event::InboundRequest;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Health,
    ListModels,
    ChatCompletions,
    ImageGeneration,
    CorsPreflight,
    NotFound,
}

impl Route {
    pub fn as_str(self) -> &'static str {
        match self {
            Route::Health => "health",
            Route::ListModels => "list_models",
            Route::ChatCompletions => "chat_completions",
            Route::ImageGeneration => "image_generation",
            Route::CorsPreflight => "cors_preflight",
            Route::NotFound => "not_found",
        }
    }
}

/// Decide which handler serves `req`.
///
/// `OPTIONS` is always a preflight. Every endpoint answers both with and
/// without the `/v1` prefix; anything else is `NotFound`.
pub fn classify_request(req: &InboundRequest) -> Route {
    if req.method == Method::OPTIONS {
        return Route::CorsPreflight;
    }

    let path = req.path.split(['?', '#']).next().unwrap_or_default();
    let bare = path.strip_prefix("/v1").filter(|rest| rest.starts_with('/'));

    let get = req.method == Method::GET;
    let post = req.method == Method::POST;
    match (path, bare.unwrap_or(path)) {
        ("/" | "/health", _) if get => Route::Health,
        (_, "/models") if get => Route::ListModels,
        (_, "/chat/completions") if post => Route::ChatCompletions,
        (_, "/images/generations") if post => Route::ImageGeneration,
        _ => Route::NotFound,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route(method: Method, path: &str) -> Route {
        classify_request(&InboundRequest::new(method, path))
    }

    #[test]
    fn both_path_forms_match() {
        assert_eq!(route(Method::GET, "/health"), Route::Health);
        assert_eq!(route(Method::GET, "/"), Route::Health);
        assert_eq!(route(Method::GET, "/v1/models"), Route::ListModels);
        assert_eq!(route(Method::GET, "/models"), Route::ListModels);
        assert_eq!(
            route(Method::POST, "/v1/chat/completions"),
            Route::ChatCompletions
        );
        assert_eq!(route(Method::POST, "/chat/completions"), Route::ChatCompletions);
        assert_eq!(
            route(Method::POST, "/v1/images/generations?x=1"),
            Route::ImageGeneration
        );
        assert_eq!(route(Method::POST, "/images/generations"), Route::ImageGeneration);
    }

    #[test]
    fn options_always_preflight() {
        assert_eq!(route(Method::OPTIONS, "/nope"), Route::CorsPreflight);
        assert_eq!(route(Method::OPTIONS, "/v1/chat/completions"), Route::CorsPreflight);
    }

    #[test]
    fn wrong_method_or_path_is_not_found() {
        assert_eq!(route(Method::GET, "/v1/chat/completions"), Route::NotFound);
        assert_eq!(route(Method::POST, "/v1/models"), Route::NotFound);
        assert_eq!(route(Method::GET, "/nope"), Route::NotFound);
        assert_eq!(route(Method::GET, "/v1"), Route::NotFound);
        assert_eq!(route(Method::GET, "/v1/health"), Route::NotFound);
        assert_eq!(route(Method::GET, "/v2/models"), Route::NotFound);
    }
}
