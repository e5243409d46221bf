//! Per-run evaluation context: call depth, private-name scopes, the dynamic
//! symbol registry and the microtask queue.
//!
//! The evaluator itself keeps no state between runs; everything mutable
//! lives here, in the heap, or in the environment arena.

use std::{collections::VecDeque, rc::Rc};

use ahash::AHashMap;

use crate::{
    generator::GenResume,
    heap::HeapId,
    intern::{StringId, SymbolId},
    object::{ClassBrandId, PrivateNameId},
    value::Value,
};

/// One class body's mapping from `#name` text to its opaque token, chained
/// to the scope of the enclosing class body (for nested classes).
#[derive(Debug)]
pub(crate) struct PrivateScope {
    pub names: AHashMap<StringId, PrivateNameId>,
    pub parent: Option<Rc<PrivateScope>>,
    pub brand: ClassBrandId,
}

impl PrivateScope {
    /// Resolves a `#name`, walking outward through enclosing class bodies.
    pub fn lookup(&self, name: StringId) -> Option<PrivateNameId> {
        if let Some(id) = self.names.get(&name) {
            return Some(*id);
        }
        self.parent.as_ref().and_then(|parent| parent.lookup(name))
    }
}

/// A queued microtask.
#[derive(Debug)]
pub(crate) enum Job {
    /// Settle a promise reaction: invoke the handler (or pass the value
    /// through) and settle the derived promise.
    PromiseReaction {
        handler: Option<Value>,
        arg: Value,
        /// Promise to settle with the handler result; `None` for reactions
        /// that only resume internal machinery.
        derived: Option<HeapId>,
        /// True when this reaction runs on the rejection path.
        is_rejection: bool,
    },
    /// Resume a suspended generator or async function body.
    ResumeGenerator { generator: HeapId, resume: GenResume },
}

/// Ambient state of one run.
#[derive(Debug)]
pub(crate) struct EvalContext {
    /// Script name for diagnostics.
    pub script: StringId,
    /// Current guest call depth, checked against the tracker's ceiling.
    pub call_depth: usize,
    /// Stack of private-name scopes; the top is the class body currently
    /// being evaluated or executed in.
    pub private_scopes: Vec<Rc<PrivateScope>>,
    next_private_name: u32,
    next_brand: u32,
    /// FIFO microtask queue, drained after the script and between resumes.
    pub jobs: VecDeque<Job>,
    /// Temp-slot frames of plan-driven bodies currently executing; the top
    /// frame backs `TempSlot` reads in lowered generator/async code.
    pub plan_temps: Vec<Vec<Value>>,
    /// Compiled plans, one per suspendable function, shared by instances.
    pub plan_cache: AHashMap<crate::intern::FunctionId, std::rc::Rc<crate::genplan::Plan>>,
    /// Descriptions of symbols created at runtime by `Symbol(...)`.
    dyn_symbol_descriptions: Vec<Option<String>>,
}

impl EvalContext {
    pub fn new(script: StringId) -> Self {
        Self {
            script,
            call_depth: 0,
            private_scopes: Vec::new(),
            next_private_name: 0,
            next_brand: 0,
            jobs: VecDeque::new(),
            plan_temps: Vec::new(),
            plan_cache: AHashMap::new(),
            dyn_symbol_descriptions: Vec::new(),
        }
    }

    pub fn alloc_private_name(&mut self) -> PrivateNameId {
        let id = PrivateNameId::new(self.next_private_name);
        self.next_private_name += 1;
        id
    }

    pub fn alloc_brand(&mut self) -> ClassBrandId {
        let id = ClassBrandId::new(self.next_brand);
        self.next_brand += 1;
        id
    }

    pub fn alloc_symbol(&mut self, description: Option<String>) -> SymbolId {
        let index = u32::try_from(self.dyn_symbol_descriptions.len()).expect("symbol table exceeds u32");
        self.dyn_symbol_descriptions.push(description);
        SymbolId::dynamic(index)
    }

    /// Description of a symbol for display, covering both well-known and
    /// runtime-created symbols.
    pub fn symbol_description(&self, id: SymbolId) -> Option<&str> {
        if let Some(desc) = id.well_known_description() {
            return Some(desc);
        }
        let index = id.dynamic_index()?;
        self.dyn_symbol_descriptions.get(index)?.as_deref()
    }

    /// The innermost private-name scope, if any class body is active.
    pub fn active_private_scope(&self) -> Option<&Rc<PrivateScope>> {
        self.private_scopes.last()
    }

    pub fn enqueue(&mut self, job: Job) {
        self.jobs.push_back(job);
    }
}
