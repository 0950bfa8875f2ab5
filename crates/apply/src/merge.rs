use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as Json};

/// Combines an observed document with a desired patch.
///
/// `last_applied` is what the caller applied previously; keys it carried that
/// the new `desired` no longer mentions are removed from the result.
pub trait Merger: Send + Sync {
    fn merge(&self, observed: &Json, last_applied: &Json, desired: &Json) -> Result<Json>;
}

/// JSON three-way merge.
///
/// Objects merge key by key, anything else (arrays included) is replaced
/// wholesale by the desired value. Observed keys the patch never mentioned
/// survive untouched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreeWayMerge;

impl Merger for ThreeWayMerge {
    fn merge(&self, observed: &Json, last_applied: &Json, desired: &Json) -> Result<Json> {
        if !observed.is_object() {
            bail!("observed document is not an object");
        }
        if !desired.is_object() {
            bail!("desired patch is not an object");
        }
        Ok(merge_value(observed, Some(last_applied), desired))
    }
}

fn merge_value(observed: &Json, last: Option<&Json>, desired: &Json) -> Json {
    match (observed, desired) {
        (Json::Object(o), Json::Object(d)) => {
            let last = last.and_then(Json::as_object);
            let mut out: Map<String, Json> = o.clone();
            if let Some(l) = last {
                for k in l.keys() {
                    if !d.contains_key(k) {
                        out.remove(k);
                    }
                }
            }
            for (k, dv) in d {
                let merged = match o.get(k) {
                    Some(ov) => merge_value(ov, last.and_then(|l| l.get(k)), dv),
                    None => dv.clone(),
                };
                out.insert(k.clone(), merged);
            }
            Json::Object(out)
        }
        _ => desired.clone(),
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    pub adds: usize,
    pub updates: usize,
    pub removes: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.adds == 0 && self.updates == 0 && self.removes == 0
    }
}

/// Count leaf-level differences of `target` against `base`, ignoring fields
/// the server owns.
pub fn diff_summary(target: &Json, base: &Json) -> DiffSummary {
    fn walk(a: &Json, b: &Json, s: &mut DiffSummary) {
        match (a, b) {
            (Json::Object(ao), Json::Object(bo)) => {
                for (k, av) in ao {
                    match bo.get(k) {
                        Some(bv) if av == bv => {}
                        Some(bv) => walk(av, bv, s),
                        None => s.adds += 1,
                    }
                }
                s.removes += bo.keys().filter(|k| !ao.contains_key(*k)).count();
            }
            (Json::Array(aa), Json::Array(bb)) => {
                s.updates += aa.iter().zip(bb).filter(|(x, y)| x != y).count();
                s.adds += aa.len().saturating_sub(bb.len());
                s.removes += bb.len().saturating_sub(aa.len());
            }
            (av, bv) => {
                if av != bv {
                    s.updates += 1;
                }
            }
        }
    }
    let mut s = DiffSummary::default();
    walk(&strip_noisy(target.clone()), &strip_noisy(base.clone()), &mut s);
    s
}

fn strip_noisy(mut v: Json) -> Json {
    if let Some(meta) = v.get_mut("metadata").and_then(Json::as_object_mut) {
        for k in ["managedFields", "resourceVersion", "generation", "creationTimestamp"] {
            meta.remove(k);
        }
    }
    if let Some(obj) = v.as_object_mut() {
        obj.remove("status");
    }
    v
}
