//! Predicate helpers shared by the resource locators
//!
//! Tag predicates use AND semantics: a resource matches only when it
//! carries every requested key with the requested value.

use std::collections::{HashMap, HashSet};

use crate::backend::{Filter, Subnet, Tag};

/// Maximum number of resources accepted by the load balancer tag APIs
pub const TAG_QUERY_CHUNK: usize = 20;

/// True when `resource_tags` contains every tag in `wanted`
pub fn tags_match(resource_tags: &[Tag], wanted: &[Tag]) -> bool {
    wanted.iter().all(|want| {
        resource_tags
            .iter()
            .any(|have| have.key == want.key && have.value == want.value)
    })
}

/// Convert a key/value map (EKS, MQ style) into a tag list
pub fn tags_from_map(map: HashMap<String, String>) -> Vec<Tag> {
    let mut tags: Vec<Tag> = map.into_iter().map(|(k, v)| Tag::new(k, v)).collect();
    tags.sort_by(|a, b| a.key.cmp(&b.key));
    tags
}

pub fn find_filter<'a>(filters: &'a [Filter], name: &str) -> Option<&'a Filter> {
    filters.iter().find(|f| f.name == name)
}

pub fn has_tag_filter(filters: &[Filter]) -> bool {
    filters.iter().any(|f| f.name.starts_with("tag:"))
}

/// Tags expressed as EC2 `tag:<key>` filters
pub fn tag_filters(tags: &[Tag]) -> Vec<Filter> {
    tags.iter()
        .map(|t| Filter::new(format!("tag:{}", t.key), [t.value.clone()]))
        .collect()
}

/// Subnet ids from `subnets` that lie in `az`
pub fn subnets_in_zone(subnets: &[Subnet], az: &str) -> HashSet<String> {
    subnets
        .iter()
        .filter(|s| s.availability_zone == az)
        .map(|s| s.subnet_id.clone())
        .collect()
}

/// `items` with everything in `removed` taken out, preserving order
pub fn without<'a>(items: &'a [String], removed: &'a HashSet<String>) -> Vec<String> {
    items
        .iter()
        .filter(|item| !removed.contains(*item))
        .cloned()
        .collect()
}
