//! The fact codec: serializing fact maps to the cached stream ("vetx") and
//! ingesting dependency streams back into a package's analysis.
//!
//! The stream is a plain concatenation of self-describing records, each
//! carrying the owning package's import path, the object path within that
//! package (empty for package facts), the fact type's canonical name, and
//! the encoded payload. There is no header and no record count; ingestion
//! reads until the stream ends.

use std::collections::HashMap;
use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use bincode::Options;
use lintra_analysis::{registered_fact_type, Fact};
use lintra_core::codec::{bincode_options, bincode_options_limited};
use lintra_core::sem::{Object, ObjectPath, Package};
use serde::{Deserialize, Serialize};

use crate::error::RunnerError;

/// Object identity within one package analysis: the `Arc` pointer. The
/// loader produces one semantic graph per load, so pointer identity is
/// exactly "same object, this analysis".
#[derive(Clone)]
pub(crate) struct ObjKey(pub Arc<Object>);

impl PartialEq for ObjKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for ObjKey {}

impl Hash for ObjKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

/// Package identity within one package analysis; see [`ObjKey`].
#[derive(Clone)]
pub(crate) struct PkgKey(pub Arc<Package>);

impl PartialEq for PkgKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for PkgKey {}

impl Hash for PkgKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct ObjectFactKey {
    pub object: ObjKey,
    pub fact_type: String,
}

#[derive(Clone, PartialEq, Eq, Hash)]
pub(crate) struct PackageFactKey {
    pub package: PkgKey,
    pub fact_type: String,
}

pub(crate) type ObjectFactMap = HashMap<ObjectFactKey, Box<dyn Fact>>;
pub(crate) type PackageFactMap = HashMap<PackageFactKey, Box<dyn Fact>>;

#[derive(Serialize, Deserialize)]
struct FactRecord {
    pkg_path: String,
    /// Empty for a package fact.
    obj_path: String,
    fact_type: String,
    payload: Vec<u8>,
}

/// Serializes the merged fact maps of one analyzed package.
///
/// Object facts whose object has no stable path are dropped: such objects
/// cannot be referenced from other packages, so their facts are useful only
/// within the run that produced them.
pub(crate) fn encode_facts(
    object_facts: &ObjectFactMap,
    package_facts: &PackageFactMap,
) -> Result<Vec<u8>, RunnerError> {
    let mut out = Vec::new();
    for (key, fact) in object_facts {
        let object = &key.object.0;
        let Some(path) = object.path.as_ref() else {
            continue;
        };
        let record = FactRecord {
            pkg_path: object.package.clone(),
            obj_path: path.as_str().to_string(),
            fact_type: fact.type_name().to_string(),
            payload: fact.encode()?,
        };
        bincode_options().serialize_into(&mut out, &record)?;
    }
    for (key, fact) in package_facts {
        let record = FactRecord {
            pkg_path: key.package.0.path.clone(),
            obj_path: String::new(),
            fact_type: fact.type_name().to_string(),
            payload: fact.encode()?,
        };
        bincode_options().serialize_into(&mut out, &record)?;
    }
    Ok(out)
}

/// Loads a dependency's cached fact stream into the current package's
/// dependency-fact maps.
///
/// Records are resolved against the transitive import closure of the current
/// package's semantic root. Anything that does not resolve (a package
/// outside the closure, an object path that no longer exists, a fact type
/// that is not registered) is skipped silently: stale cached facts must not
/// fail the run, they simply become invisible. A malformed record ends
/// ingestion of the stream the same way.
pub(crate) fn ingest_facts(
    path: &Path,
    root: &Arc<Package>,
    object_facts: &mut ObjectFactMap,
    package_facts: &mut PackageFactMap,
) -> Result<(), RunnerError> {
    let file = File::open(path)?;
    let mut reader = BufReader::new(file);
    let packages = root.transitive_imports();

    loop {
        if reader.fill_buf()?.is_empty() {
            break;
        }
        let record: FactRecord = match bincode_options_limited().deserialize_from(&mut reader) {
            Ok(record) => record,
            Err(err) => {
                tracing::debug!(
                    target = "lintra.runner",
                    path = %path.display(),
                    error = %err,
                    "malformed record in cached fact stream; ignoring the rest"
                );
                break;
            }
        };

        let Some(package) = packages.get(&record.pkg_path) else {
            continue;
        };
        let Some(fact_type) = registered_fact_type(&record.fact_type) else {
            continue;
        };
        let fact = match (fact_type.decode)(&record.payload) {
            Ok(fact) => fact,
            Err(err) => {
                tracing::debug!(
                    target = "lintra.runner",
                    path = %path.display(),
                    fact_type = record.fact_type,
                    error = %err,
                    "undecodable cached fact; skipping"
                );
                continue;
            }
        };

        if record.obj_path.is_empty() {
            package_facts.insert(
                PackageFactKey {
                    package: PkgKey(Arc::clone(package)),
                    fact_type: record.fact_type,
                },
                fact,
            );
        } else {
            let Some(object) = package.resolve(&ObjectPath::new(record.obj_path.as_str())) else {
                continue;
            };
            object_facts.insert(
                ObjectFactKey {
                    object: ObjKey(Arc::clone(object)),
                    fact_type: record.fact_type,
                },
                fact,
            );
        }
    }
    Ok(())
}
