//! Sources written into the output layout before bundling.
//!
//! The generated JavaScript speaks the same protocol as [`crate::protocol`]:
//! path markers are `{ pathRef: [...] }`, only the module root falls back to
//! the namespace, and each sibling instance holds its references in a bounded
//! store.

use crate::domain::model::SplitPlan;
use crate::protocol::{ReferenceStore, BLOCKED_SEGMENTS};
use crate::utils::error::Result;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

pub const STUBS_DIR: &str = "src/__stubs";
pub const ENV_MODULE: &str = "_env.js";
pub const ENTRY_SHIM: &str = "src/_entry.js";
pub const SERVICE_SOURCE: &str = "src/index.js";
pub const BUNDLE_FILE: &str = "dist/index.js";

static EXPORT_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_$][A-Za-z0-9_$]*$").expect("valid export name pattern"));

const ENV_MODULE_SOURCE: &str = r#"let currentEnv = null;

export function __setEnv(env) {
  currentEnv = env;
}

export function getBinding(name) {
  if (!currentEnv) {
    throw new Error("[overwork] env not initialized. Call __setEnv(env) before using a relocated package.");
  }
  const binding = currentEnv[name];
  if (!binding) {
    throw new Error(`[overwork] Service binding "${name}" not found in env. Check your wrangler.jsonc.`);
  }
  return binding;
}

const handles = new WeakMap();

function prepareArg(arg) {
  if (arg === null || arg === undefined) return arg;
  const handle = handles.get(arg);
  if (handle) {
    if (!handle.target) return { pathRef: handle.path };
    if (handle.path.length === 0) return handle.target;
    throw new Error(`[overwork] Cannot pass member "${handle.path.join(".")}" of a reference as an argument; call it first`);
  }
  if (Array.isArray(arg)) return arg.map(prepareArg);
  if (typeof arg === "object" && Object.getPrototypeOf(arg) === Object.prototype) {
    return Object.fromEntries(Object.entries(arg).map(([k, v]) => [k, prepareArg(v)]));
  }
  return arg;
}

function wrapResult(result) {
  if (result != null && typeof result.callChain === "function") {
    return makeHandle((path, args) => result.callChain(path, args), [], result);
  }
  return result;
}

function makeHandle(invoke, path, target) {
  const handle = new Proxy(function () {}, {
    get(_, prop) {
      if (prop === "then" || typeof prop === "symbol") return undefined;
      if (prop === "__esModule") return true;
      return makeHandle(invoke, [...path, prop], target);
    },
    apply(_, __, args) {
      if (!target && path.length === 0) {
        throw new Error("[overwork] Cannot call module root as a function");
      }
      return Promise.resolve(invoke(path, args.map(prepareArg))).then(wrapResult);
    },
  });
  handles.set(handle, { path, target });
  return handle;
}

export function createHandle(bindingFor, path) {
  return makeHandle((p, args) => bindingFor().callChain(p, args), path || [], null);
}
"#;

const CLIENT_STUB_SOURCE: &str = r#"import { __setEnv, getBinding, createHandle } from "./_env.js";
export { __setEnv };

const binding = () => getBinding(%BINDING%);

%EXPORTS%
export default createHandle(binding, []);
"#;

const STUB_TYPES_SOURCE: &str = r#"export declare function __setEnv(env: Record<string, unknown>): void;

%EXPORTS%
declare const root: any;
export default root;
"#;

const ENTRY_SHIM_SOURCE: &str = r#"import { __setEnv } from "./__stubs/_env.js";
import worker from %ENTRY%;

export default {
  async fetch(request, env, ctx) {
    __setEnv(env);
    return worker.fetch(request, env, ctx);
  },

  async scheduled(event, env, ctx) {
    __setEnv(env);
    if (worker.scheduled) {
      return worker.scheduled(event, env, ctx);
    }
  },

  async queue(batch, env, ctx) {
    __setEnv(env);
    if (worker.queue) {
      return worker.queue(batch, env, ctx);
    }
  },
};
"#;

const SERVICE_WORKER_SOURCE: &str = r#"import { WorkerEntrypoint, RpcTarget } from "cloudflare:workers";
import * as sdk from %PACKAGE%;

const BLOCKED = new Set(%BLOCKED%);
const STORE_CAPACITY = %CAPACITY%;

const store = new Map();
let nextId = 0;

function validatePath(path) {
  for (const segment of path) {
    if (BLOCKED.has(segment)) {
      throw new Error(`[overwork] Blocked path segment: "${segment}"`);
    }
  }
}

function isByValue(value) {
  if (value === null || value === undefined) return true;
  const type = typeof value;
  if (type !== "object" && type !== "function") return true;
  if (value instanceof ArrayBuffer || ArrayBuffer.isView(value)) return true;
  if (value instanceof ReadableStream) return true;
  if (Array.isArray(value) || value instanceof Date || value instanceof RegExp) return true;
  if (value instanceof Map || value instanceof Set) return true;
  const proto = Object.getPrototypeOf(value);
  return proto === Object.prototype || proto === null;
}

function hold(value) {
  const id = nextId++;
  store.set(id, value);
  if (store.size > STORE_CAPACITY) {
    store.delete(store.keys().next().value);
  }
  return new Held(value, id);
}

function lookup(id) {
  if (!store.has(id)) {
    throw new Error(`[overwork] Cannot resolve reference ${id} (unknown or evicted)`);
  }
  const value = store.get(id);
  store.delete(id);
  store.set(id, value);
  return value;
}

function toWire(value) {
  return isByValue(value) ? value : hold(value);
}

function walk(root, path, fromNamespace) {
  let parent = root;
  let current = root;
  for (let i = 0; i < path.length; i++) {
    let next = current == null ? undefined : current[path[i]];
    if (next == null && i === 0 && fromNamespace) {
      next = sdk[path[i]];
      current = sdk;
    }
    if (next == null) {
      throw new Error(`[overwork] Cannot resolve "${path.slice(0, i + 1).join(".")}"`);
    }
    parent = current;
    current = next;
  }
  return [parent, current];
}

function resolveArg(arg) {
  if (arg instanceof Held) return arg.value;
  if (arg && typeof arg._heldId === "function") return lookup(arg._heldId());
  if (arg && typeof arg === "object" && Array.isArray(arg.pathRef)) {
    validatePath(arg.pathRef);
    return walk(sdk.default ?? sdk, arg.pathRef, true)[1];
  }
  if (Array.isArray(arg)) return arg.map(resolveArg);
  if (arg && typeof arg === "object" && Object.getPrototypeOf(arg) === Object.prototype) {
    return Object.fromEntries(Object.entries(arg).map(([k, v]) => [k, resolveArg(v)]));
  }
  return arg;
}

async function invoke(root, path, args, fromNamespace) {
  validatePath(path);
  const [receiver, target] = walk(root, path, fromNamespace);
  if (typeof target !== "function") return toWire(target);
  const result = await target.apply(receiver, (args || []).map(resolveArg));
  return toWire(result);
}

class Held extends RpcTarget {
  #value;
  #id;

  constructor(value, id) {
    super();
    this.#value = value;
    this.#id = id;
  }

  get value() {
    return this.#value;
  }

  _heldId() {
    return this.#id;
  }

  callChain(path, args) {
    return invoke(lookup(this.#id), path, args, false);
  }
}

export class %ENTRYPOINT% extends WorkerEntrypoint {
  callChain(path, args) {
    return invoke(sdk.default ?? sdk, path, args, true);
  }
}

export default {
  async fetch() {
    return new Response(%BANNER%);
  },
};
"#;

/// JavaScript string literal for `value`.
fn js_string(value: &str) -> Result<String> {
    Ok(serde_json::to_string(value)?)
}

/// Export names that can be bound as named exports. `default` is always the
/// root handle.
fn named_exports(plan: &SplitPlan) -> impl Iterator<Item = (usize, &str)> {
    plan.export_names
        .iter()
        .map(String::as_str)
        .filter(|name| *name != "default")
        .filter(|name| {
            let valid = EXPORT_NAME.is_match(name);
            if !valid {
                tracing::warn!("Skipping export {:?}: not a valid identifier", name);
            }
            valid
        })
        .enumerate()
}

/// `@scope/pkg` becomes `_scope_pkg.stub.js`.
pub fn stub_file_name(package: &str) -> String {
    format!("{}.stub.js", package.replace(['@', '/'], "_"))
}

pub fn env_module() -> &'static str {
    ENV_MODULE_SOURCE
}

/// Module that replaces `plan.package_name` inside the main unit.
pub fn client_stub(plan: &SplitPlan) -> Result<String> {
    let mut exports = String::new();
    for (i, name) in named_exports(plan) {
        exports.push_str(&format!(
            "const e{i} = createHandle(binding, [{}]);\nexport {{ e{i} as {name} }};\n",
            js_string(name)?
        ));
    }
    Ok(CLIENT_STUB_SOURCE
        .replace("%BINDING%", &js_string(&plan.binding_name)?)
        .replace("%EXPORTS%", &exports))
}

pub fn stub_types(plan: &SplitPlan) -> String {
    let exports: String = named_exports(plan)
        .map(|(i, name)| format!("declare const e{i}: any;\nexport {{ e{i} as {name} }};\n"))
        .collect();
    STUB_TYPES_SOURCE.replace("%EXPORTS%", &exports)
}

/// Wraps the original worker so `env` is captured before any handler runs.
pub fn entry_shim(original_entry: &Path) -> Result<String> {
    let import = original_entry.to_string_lossy().replace('\\', "/");
    Ok(ENTRY_SHIM_SOURCE.replace("%ENTRY%", &js_string(&import)?))
}

/// Sibling worker hosting `plan.package_name` behind its entrypoint class.
pub fn service_worker(plan: &SplitPlan) -> Result<String> {
    let banner = format!(
        "{} is running. This Worker is called via Service Binding RPC, not HTTP.",
        plan.service_name
    );
    Ok(SERVICE_WORKER_SOURCE
        .replace("%PACKAGE%", &js_string(&plan.package_name)?)
        .replace("%BLOCKED%", &serde_json::to_string(&BLOCKED_SEGMENTS)?)
        .replace("%CAPACITY%", &ReferenceStore::DEFAULT_CAPACITY.to_string())
        .replace("%ENTRYPOINT%", &plan.entrypoint_identifier)
        .replace("%BANNER%", &js_string(&banner)?))
}
