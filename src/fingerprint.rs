//! Call-site fingerprinting
//!
//! Derives a stable 64-bit identity for the application call path behind
//! an observed operation by walking the calling thread's own stack. Frames
//! are consumed only while they stay inside the interception site's module
//! prefix, so library and runtime internals never contribute to identity.
//! The same call path therefore always folds to the same id within a run.
//!
//! Walks are bounded by [`MAX_WALK_DEPTH`] so pathological recursion cannot
//! make a single observation arbitrarily expensive.

use crate::event::CodeSource;
use fnv::FnvHasher;
use std::hash::Hasher;

/// Maximum stack frames consumed per fingerprint (prevent runaway walks)
pub const MAX_WALK_DEPTH: usize = 64;

/// Module path segments kept when deriving the call-path prefix
pub const DEFAULT_PREFIX_SEGMENTS: usize = 3;

/// Lexical position of an interception site.
///
/// Built at the true application call site by [`call_site!`](crate::call_site),
/// never by hand, so `module` names the code that made the observed call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallSite {
    /// Module path owning the call site (`module_path!`)
    pub module: &'static str,
    /// Source file of the call site (`file!`)
    pub file: &'static str,
    /// Line of the call site (`line!`)
    pub line: u32,
}

/// Capture the current lexical position as a [`CallSite`].
///
/// Expand this macro where the observed call is made, not inside helper
/// layers: the module path it records bounds the stack walk.
#[macro_export]
macro_rules! call_site {
    () => {
        $crate::fingerprint::CallSite {
            module: module_path!(),
            file: file!(),
            line: line!(),
        }
    };
}

/// Pure call-path fingerprint engine.
///
/// `code_source` reads only the calling thread's stack: no I/O, no shared
/// state, no failure mode. An empty walk degrades to id `0`.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    prefix_segments: usize,
    max_depth: usize,
}

impl Fingerprinter {
    /// Engine with the default prefix width and depth cap.
    pub fn new() -> Self {
        Self {
            prefix_segments: DEFAULT_PREFIX_SEGMENTS,
            max_depth: MAX_WALK_DEPTH,
        }
    }

    /// Engine with explicit limits. A zero depth cap yields id `0` for
    /// every site; a zero prefix width is widened to one segment.
    pub fn with_limits(prefix_segments: usize, max_depth: usize) -> Self {
        Self {
            prefix_segments: prefix_segments.max(1),
            max_depth,
        }
    }

    /// Resolve the identity of the call path currently on the stack.
    ///
    /// # Algorithm
    ///
    /// 1. Keep at most the first [`DEFAULT_PREFIX_SEGMENTS`] segments of
    ///    `site.module` as the application prefix.
    /// 2. Walk the live stack innermost-first, skipping the engine's own
    ///    trampoline frames.
    /// 3. Consume frames while their demangled name starts with the
    ///    prefix; stop at the first that does not, or at the depth cap.
    /// 4. Fold consumed names into `id = id * 31 + fnv64(name)`.
    pub fn code_source(&self, site: CallSite) -> CodeSource {
        let prefix = module_prefix(site.module, self.prefix_segments);

        let mut id: u64 = 0;
        let mut consumed = 0usize;
        let mut past_trampoline = false;

        backtrace::trace(|frame| {
            let mut resolved: Option<String> = None;
            backtrace::resolve_frame(frame, |symbol| {
                if resolved.is_none() {
                    if let Some(name) = symbol.name() {
                        resolved = Some(name.to_string());
                    }
                }
            });

            let raw = match resolved {
                Some(name) => name,
                // Unresolvable frames before the application code are
                // unwinder plumbing; one inside the prefix run ends it.
                None => return !past_trampoline,
            };
            let frame_name = strip_symbol_hash(&raw);

            if !past_trampoline {
                if is_trampoline(frame_name) {
                    return true;
                }
                past_trampoline = true;
            }

            if consumed >= self.max_depth || !frame_name.starts_with(prefix.as_str()) {
                return false;
            }

            id = accumulate(id, frame_name);
            consumed += 1;
            true
        });

        CodeSource {
            id,
            label: site.file.to_string(),
            line: site.line,
        }
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

/// First `segments` path segments of a module path.
fn module_prefix(module: &str, segments: usize) -> String {
    let mut end = module.len();
    for (index, (pos, _)) in module.match_indices("::").enumerate() {
        if index + 1 == segments {
            end = pos;
            break;
        }
    }
    module[..end].to_string()
}

/// Fold an ordered sequence of frame names into a fingerprint id.
///
/// This is the accumulation `code_source` applies to the consumed frames;
/// exposed so expected ids can be computed from known call paths. An
/// empty sequence folds to `0`.
pub fn fold_frames<'a>(frames: impl IntoIterator<Item = &'a str>) -> u64 {
    frames.into_iter().fold(0, accumulate)
}

/// Fold one frame name into the running fingerprint.
fn accumulate(id: u64, frame_name: &str) -> u64 {
    id.wrapping_mul(31).wrapping_add(fnv64(frame_name))
}

fn fnv64(input: &str) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(input.as_bytes());
    hasher.finish()
}

/// Frames belonging to the engine itself or to the unwinder.
fn is_trampoline(frame_name: &str) -> bool {
    frame_name.starts_with("backtrace")
        || frame_name.contains("netlens::fingerprint::Fingerprinter")
}

/// Drop the `::h<16 hex>` disambiguator rustc appends to symbol names,
/// leaving the fully-qualified containing path.
fn strip_symbol_hash(name: &str) -> &str {
    if let Some(pos) = name.rfind("::h") {
        let suffix = &name[pos + 3..];
        if suffix.len() == 16 && suffix.bytes().all(|b| b.is_ascii_hexdigit()) {
            return &name[..pos];
        }
    }
    name
}
