use std::collections::HashMap;

use axum::http::Method;
use regex::Regex;
use serde_json::Value;

use super::request::ValidationRequest;
use super::schema::RouteSchema;

/// Placeholder that replaces the application id segment in route templates.
pub const APP_ID_PLACEHOLDER: &str = ":appId";

/// Params key that receives the concrete application id.
pub const APP_ID_PARAM: &str = "appId";

/// Route schemas keyed by `(method, template)`. Built once at startup and
/// never mutated afterwards.
#[derive(Debug)]
pub struct RouteRegistry {
    routes: HashMap<(Method, String), RouteSchema>,
    app_id_path: Option<Regex>,
}

impl RouteRegistry {
    pub fn builder() -> RouteRegistryBuilder {
        RouteRegistryBuilder::default()
    }

    /// Replace the app id segment with [`APP_ID_PLACEHOLDER`].
    /// Returns the template and the concrete id, if one was found.
    pub fn normalize<'a>(&self, path: &'a str) -> (String, Option<&'a str>) {
        let path = match path.strip_suffix('/') {
            Some(trimmed) if !trimmed.is_empty() => trimmed,
            _ => path,
        };

        if let Some(caps) = self.app_id_path.as_ref().and_then(|re| re.captures(path)) {
            if let (Some(prefix), Some(id)) = (caps.get(1), caps.get(2)) {
                let rest = caps.get(3).map_or("", |m| m.as_str());
                let template = format!("{}/{}{}", prefix.as_str(), APP_ID_PLACEHOLDER, rest);
                return (template, Some(id.as_str()));
            }
        }
        (path.to_string(), None)
    }

    /// Find the schema for `request`, recording the app id from the path in
    /// `request.params`. `None` means the route is not validated.
    pub fn resolve(&self, request: &mut ValidationRequest) -> Option<&RouteSchema> {
        let (template, app_id) = self.normalize(&request.path);
        if let Some(id) = app_id {
            request
                .params
                .insert(APP_ID_PARAM.to_string(), Value::String(id.to_string()));
        }
        self.routes.get(&(request.method.clone(), template))
    }

    pub fn get(&self, method: &Method, template: &str) -> Option<&RouteSchema> {
        self.routes.get(&(method.clone(), template.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[derive(Default)]
pub struct RouteRegistryBuilder {
    routes: HashMap<(Method, String), RouteSchema>,
    prefixes: Vec<String>,
}

impl RouteRegistryBuilder {
    /// Paths starting with `prefix` carry an application id as their next
    /// segment, e.g. `/v2/applications` for `/v2/applications/123/restart`.
    pub fn app_id_prefix(mut self, prefix: &str) -> Self {
        self.prefixes.push(prefix.trim_end_matches('/').to_string());
        self
    }

    /// Register `schema` for `(method, template)`. A later registration for
    /// the same key replaces the earlier one.
    pub fn route(mut self, method: Method, template: &str, schema: RouteSchema) -> Self {
        if self
            .routes
            .insert((method.clone(), template.to_string()), schema)
            .is_some()
        {
            log::warn!("Route schema for {} {} registered twice", method, template);
        }
        self
    }

    pub fn build(self) -> RouteRegistry {
        let app_id_path = if self.prefixes.is_empty() {
            None
        } else {
            let alternatives: Vec<String> = self.prefixes.iter().map(|p| regex::escape(p)).collect();
            let pattern = format!("^({})/([^/]+)(/.*)?$", alternatives.join("|"));
            // Escaped literals joined by `|` always form a valid pattern.
            Regex::new(&pattern).ok()
        };

        RouteRegistry {
            routes: self.routes,
            app_id_path,
        }
    }
}
