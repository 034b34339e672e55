//! Resource declaration validation and dependency ordering

use crate::error::ConfigError;
use crate::types::{Ensure, Resource, ResourceKind};
use std::collections::{BTreeSet, HashMap, HashSet};

/// Validate a set of resource declarations
///
/// Checks id uniqueness, kind-specific shape, that every dependency is
/// declared, and that `depends_on` forms a DAG. No side effects.
pub fn validate(resources: &[Resource]) -> Result<(), ConfigError> {
    let index = index_by_id(resources)?;

    for resource in resources {
        check_shape(resource)?;
    }

    sort(resources, &index).map(|_| ())
}

/// Indices of `resources` in dependency order
///
/// Kahn's algorithm; among resources that are ready at the same time the
/// one declared first comes first, so the order is deterministic.
pub fn topological_order(resources: &[Resource]) -> Result<Vec<usize>, ConfigError> {
    let index = index_by_id(resources)?;
    sort(resources, &index)
}

/// Longest dependency chain below each resource, indexed like `resources`
///
/// Resources on the same level have no dependency path between them.
pub fn dependency_levels(resources: &[Resource]) -> Result<Vec<usize>, ConfigError> {
    let index = index_by_id(resources)?;
    let order = sort(resources, &index)?;

    let mut levels = vec![0usize; resources.len()];
    for i in order {
        let level = resources[i]
            .depends_on
            .iter()
            .filter_map(|dep| index.get(dep.as_str()))
            .map(|&j| levels[j] + 1)
            .max()
            .unwrap_or(0);
        levels[i] = level;
    }
    Ok(levels)
}

fn index_by_id(resources: &[Resource]) -> Result<HashMap<&str, usize>, ConfigError> {
    let mut index = HashMap::with_capacity(resources.len());
    for (i, resource) in resources.iter().enumerate() {
        if index.insert(resource.id.as_str(), i).is_some() {
            return Err(ConfigError::DuplicateId {
                id: resource.id.clone(),
            });
        }
    }
    Ok(index)
}

fn sort(resources: &[Resource], index: &HashMap<&str, usize>) -> Result<Vec<usize>, ConfigError> {
    let n = resources.len();
    let mut in_degree = vec![0usize; n];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

    for (i, resource) in resources.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &resource.depends_on {
            if !seen.insert(dep.as_str()) {
                continue;
            }
            let j = *index
                .get(dep.as_str())
                .ok_or_else(|| ConfigError::UnknownDependency {
                    id: resource.id.clone(),
                    dependency: dep.clone(),
                })?;
            in_degree[i] += 1;
            dependents[j].push(i);
        }
    }

    let mut ready: BTreeSet<usize> = (0..n).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(n);

    while let Some(i) = ready.pop_first() {
        order.push(i);
        for &d in &dependents[i] {
            in_degree[d] -= 1;
            if in_degree[d] == 0 {
                ready.insert(d);
            }
        }
    }

    if order.len() < n {
        return Err(ConfigError::CyclicDependency {
            cycle: find_cycle(resources, index, &in_degree),
        });
    }

    Ok(order)
}

/// Walk unresolved dependency edges until a node repeats
///
/// Every resource left with a nonzero in-degree after Kahn's pass has at
/// least one dependency that is also left, so the walk always closes.
fn find_cycle(
    resources: &[Resource],
    index: &HashMap<&str, usize>,
    in_degree: &[usize],
) -> Vec<String> {
    let Some(start) = (0..resources.len()).find(|&i| in_degree[i] > 0) else {
        return Vec::new();
    };

    let mut path: Vec<usize> = Vec::new();
    let mut position: HashMap<usize, usize> = HashMap::new();
    let mut current = start;

    loop {
        if let Some(&at) = position.get(&current) {
            let mut cycle: Vec<String> = path[at..]
                .iter()
                .map(|&i| resources[i].id.clone())
                .collect();
            cycle.push(resources[current].id.clone());
            return cycle;
        }
        position.insert(current, path.len());
        path.push(current);

        let next = resources[current]
            .depends_on
            .iter()
            .filter_map(|dep| index.get(dep.as_str()).copied())
            .find(|&j| in_degree[j] > 0);

        match next {
            Some(j) => current = j,
            None => return path.iter().map(|&i| resources[i].id.clone()).collect(),
        }
    }
}

fn check_shape(resource: &Resource) -> Result<(), ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidResource {
        id: resource.id.clone(),
        reason: reason.to_string(),
    };

    if resource.id.trim().is_empty() {
        return Err(invalid("id must not be empty"));
    }
    if resource.target.trim().is_empty() {
        return Err(invalid("target must not be empty"));
    }

    let desired = &resource.desired;
    let present = desired.ensure == Ensure::Present;

    if desired.mode.is_some() && resource.kind != ResourceKind::FileContent {
        return Err(invalid("mode only applies to file_content resources"));
    }
    if desired.fallback.is_some() && !resource.kind.is_versioned() {
        return Err(invalid("fallback only applies to versioned resources"));
    }
    if desired.content.is_some() && resource.kind != ResourceKind::FileContent {
        return Err(invalid("content only applies to file_content resources"));
    }

    match resource.kind {
        ResourceKind::FileContent => {
            if !resource.target.starts_with('/') {
                return Err(invalid("file path must be absolute"));
            }
            if desired.content.is_some() && desired.source.is_some() {
                return Err(invalid("content and source are mutually exclusive"));
            }
            if present
                && desired.value.is_none()
                && desired.content.is_none()
                && desired.source.is_none()
            {
                return Err(invalid("file needs a digest, content or source"));
            }
            if let Some(digest) = &desired.value
                && !is_blake3_hex(digest)
            {
                return Err(invalid("value must be a 64-character blake3 hex digest"));
            }
            if let (Some(digest), Some(content)) = (&desired.value, &desired.content)
                && !blake3::hash(content.as_bytes())
                    .to_hex()
                    .eq_ignore_ascii_case(digest)
            {
                return Err(invalid("value does not match the digest of content"));
            }
            if let Some(mode) = desired.mode
                && mode > 0o7777
            {
                return Err(invalid("mode must be at most 0o7777"));
            }
        }
        ResourceKind::EnvVarSet => {
            if !is_env_name(&resource.target) {
                return Err(invalid("target is not a valid variable name"));
            }
            if present && desired.value.is_none() {
                return Err(invalid("env var needs a value"));
            }
        }
        ResourceKind::KernelModuleBlacklisted | ResourceKind::KernelModuleLoaded => {
            if resource
                .target
                .chars()
                .any(|c| c.is_whitespace() || c == '/')
            {
                return Err(invalid("module name must not contain whitespace or '/'"));
            }
        }
        ResourceKind::PackageInstalled | ResourceKind::PipPackageVersion => {
            if resource.target.chars().any(char::is_whitespace) {
                return Err(invalid("package name must not contain whitespace"));
            }
        }
    }

    Ok(())
}

fn is_blake3_hex(s: &str) -> bool {
    s.len() == 64 && s.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_env_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
