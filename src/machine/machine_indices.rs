use crate::clause_types::*;
use crate::forms::*;
use crate::indexing::*;
use crate::machine::config::*;
use crate::machine::dispatch::is_control_construct;
use crate::machine::dynamic_database::*;
use crate::machine::heap::*;
use crate::machine::machine_errors::*;
use crate::machine::system_calls::*;
use crate::machine::tabling::*;
use crate::machine::tail_recursion::*;
use crate::types::*;

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use std::fmt;
use std::sync::Arc;

/// The compiled form of a static predicate: classified clauses, the
/// argument index over them and, if the shape allows, a loop plan.
#[derive(Debug)]
pub struct CompiledPredicate {
    pub(crate) key: PredicateKey,
    pub(crate) clauses: Vec<ClassifiedClause>,
    pub(crate) indexer: Option<ClauseIndexer>,
    pub(crate) tail_loop: Option<TailLoop>,
    all: Arc<[usize]>,
}

impl CompiledPredicate {
    pub(crate) fn new(key: PredicateKey, clauses: Vec<Clause>, config: &MachineConfig) -> Self {
        let clauses: Vec<ClassifiedClause> = clauses.into_iter().map(ClassifiedClause::new).collect();

        let indexer = if clauses.len() > 1 {
            Some(ClauseIndexer::new(&clauses, config.index_cache_capacity))
                .filter(|indexer| !indexer.eligible_positions().is_empty())
        } else {
            None
        };

        let tail_loop = if config.tail_recursion {
            TailLoop::detect(key, &clauses)
        } else {
            None
        };

        tracing::debug!(
            predicate = %KeyDisplay(key),
            clauses = clauses.len(),
            indexed = ?indexer.as_ref().map(ClauseIndexer::eligible_positions),
            tail_loop = tail_loop.is_some(),
            "compiled predicate"
        );

        CompiledPredicate {
            key,
            all: (0..clauses.len()).collect(),
            clauses,
            indexer,
            tail_loop,
        }
    }

    /// The clauses that can match a call with these arguments.
    #[inline]
    pub fn candidates(&self, heap: &Heap, args: &[Term]) -> Arc<[usize]> {
        match &self.indexer {
            Some(indexer) => indexer.candidates(heap, args),
            None => self.all.clone(),
        }
    }

    #[inline]
    pub fn clauses(&self) -> &[ClassifiedClause] {
        &self.clauses
    }
}

#[derive(Debug)]
enum StaticState {
    Loading(Vec<Clause>),
    Compiled(Arc<CompiledPredicate>),
}

/// The clauses of a static predicate. They are collected while the
/// program loads and compiled by the first call, after which the
/// predicate is frozen.
#[derive(Debug)]
pub struct StaticCode {
    key: PredicateKey,
    state: Mutex<StaticState>,
}

impl StaticCode {
    fn new(key: PredicateKey, clauses: Vec<Clause>) -> Self {
        StaticCode {
            key,
            state: Mutex::new(StaticState::Loading(clauses)),
        }
    }

    fn push(&self, clause: Clause) -> Result<(), EngineError> {
        match &mut *self.state.lock() {
            StaticState::Loading(clauses) => {
                clauses.push(clause);
                Ok(())
            }
            StaticState::Compiled(_) => Err(EngineError::StaticProcedure(self.key)),
        }
    }

    // the clauses, if nothing has called the predicate yet.
    fn take_uncompiled(&self) -> Option<Vec<Clause>> {
        match &mut *self.state.lock() {
            StaticState::Loading(clauses) => Some(std::mem::take(clauses)),
            StaticState::Compiled(_) => None,
        }
    }

    pub fn compiled(&self, config: &MachineConfig) -> Arc<CompiledPredicate> {
        let mut state = self.state.lock();

        match &mut *state {
            StaticState::Compiled(compiled) => compiled.clone(),
            StaticState::Loading(clauses) => {
                let clauses = std::mem::take(clauses);
                let compiled = Arc::new(CompiledPredicate::new(self.key, clauses, config));

                *state = StaticState::Compiled(compiled.clone());
                compiled
            }
        }
    }
}

#[derive(Debug)]
pub enum PredicateEntry {
    Static(StaticCode),
    Dynamic(DynamicPredicate),
    Tabled(StaticCode, AnswerTable),
}

impl PredicateEntry {
    fn kind(&self) -> &'static str {
        match self {
            PredicateEntry::Static(_) => "static",
            PredicateEntry::Dynamic(_) => "dynamic",
            PredicateEntry::Tabled(..) => "tabled",
        }
    }

    #[inline]
    pub(crate) fn as_dynamic(&self) -> Option<&DynamicPredicate> {
        match self {
            PredicateEntry::Dynamic(pred) => Some(pred),
            _ => None,
        }
    }
}

pub(crate) type CodeDir = IndexMap<PredicateKey, Arc<PredicateEntry>, FxBuildHasher>;

/// Everything a query consults: the predicate table, the built-ins and
/// the configuration the machine was built with.
pub struct IndexStore {
    pub(crate) code_dir: RwLock<CodeDir>,
    pub(crate) builtins: RwLock<IndexMap<PredicateKey, Builtin, FxBuildHasher>>,
    pub(crate) config: MachineConfig,
}

impl fmt::Debug for IndexStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexStore")
            .field("code_dir", &self.code_dir.read().len())
            .field("builtins", &self.builtins.read().len())
            .field("config", &self.config)
            .finish()
    }
}

impl IndexStore {
    pub(crate) fn new(config: MachineConfig) -> Self {
        IndexStore {
            code_dir: RwLock::new(CodeDir::default()),
            builtins: RwLock::new(IndexMap::default()),
            config,
        }
    }

    #[inline]
    pub(crate) fn lookup(&self, key: &PredicateKey) -> Option<Arc<PredicateEntry>> {
        self.code_dir.read().get(key).cloned()
    }

    #[inline]
    pub(crate) fn builtin(&self, key: &PredicateKey) -> Option<Builtin> {
        self.builtins.read().get(key).cloned()
    }

    pub(crate) fn register_builtin(&self, key: PredicateKey, builtin: Builtin) {
        self.builtins.write().insert(key, builtin);
    }

    fn check_modifiable(&self, key: PredicateKey) -> Result<(), EngineError> {
        if is_control_construct(key) || self.builtins.read().contains_key(&key) {
            Err(EngineError::StaticProcedure(key))
        } else {
            Ok(())
        }
    }

    /// Adds a clause while loading a program. New predicates are
    /// static unless declared otherwise.
    pub(crate) fn add_clause(&self, clause: Clause) -> Result<(), EngineError> {
        let key = clause.key();
        self.check_modifiable(key)?;

        let mut code_dir = self.code_dir.write();

        match code_dir.get(&key) {
            Some(entry) => match &**entry {
                PredicateEntry::Static(code) | PredicateEntry::Tabled(code, _) => code.push(clause),
                PredicateEntry::Dynamic(pred) => {
                    pred.assert(clause, AppendOrPrepend::Append);
                    Ok(())
                }
            },
            None => {
                let entry = PredicateEntry::Static(StaticCode::new(key, vec![clause]));
                code_dir.insert(key, Arc::new(entry));
                Ok(())
            }
        }
    }

    /// `assert/1` and friends: only dynamic predicates may change once
    /// the program runs.
    pub(crate) fn assert(
        &self,
        clause: Clause,
        append_or_prepend: AppendOrPrepend,
    ) -> Result<(), EngineError> {
        let key = clause.key();
        self.check_modifiable(key)?;

        if let Some(entry) = self.lookup(&key) {
            return match &*entry {
                PredicateEntry::Dynamic(pred) => {
                    pred.assert(clause, append_or_prepend);
                    Ok(())
                }
                _ => Err(EngineError::StaticProcedure(key)),
            };
        }

        let mut code_dir = self.code_dir.write();

        // another writer may have created the predicate meanwhile.
        let entry = code_dir
            .entry(key)
            .or_insert_with(|| Arc::new(PredicateEntry::Dynamic(DynamicPredicate::default())))
            .clone();

        drop(code_dir);

        match &*entry {
            PredicateEntry::Dynamic(pred) => {
                pred.assert(clause, append_or_prepend);
                Ok(())
            }
            _ => Err(EngineError::StaticProcedure(key)),
        }
    }

    /// Makes `key` dynamic. Clauses loaded before the declaration are
    /// kept, as long as nothing has called the predicate yet.
    pub(crate) fn declare_dynamic(&self, key: PredicateKey) -> Result<(), EngineError> {
        self.check_modifiable(key)?;

        let mut code_dir = self.code_dir.write();

        let clauses = match code_dir.get(&key).map(|entry| &**entry) {
            None => vec![],
            Some(PredicateEntry::Dynamic(_)) => return Ok(()),
            Some(PredicateEntry::Static(code)) => code
                .take_uncompiled()
                .ok_or(EngineError::Redeclared(key, "static"))?,
            Some(entry) => return Err(EngineError::Redeclared(key, entry.kind())),
        };

        code_dir.insert(
            key,
            Arc::new(PredicateEntry::Dynamic(DynamicPredicate::new(clauses))),
        );

        Ok(())
    }

    /// Makes `key` tabled, keeping any clauses loaded so far.
    pub(crate) fn declare_tabled(&self, key: PredicateKey) -> Result<(), EngineError> {
        self.check_modifiable(key)?;

        let mut code_dir = self.code_dir.write();

        let clauses = match code_dir.get(&key).map(|entry| &**entry) {
            None => vec![],
            Some(PredicateEntry::Tabled(..)) => return Ok(()),
            Some(PredicateEntry::Static(code)) => code
                .take_uncompiled()
                .ok_or(EngineError::Redeclared(key, "static"))?,
            Some(entry) => return Err(EngineError::Redeclared(key, entry.kind())),
        };

        let table = AnswerTable::new(self.config.table_cache_capacity);

        code_dir.insert(
            key,
            Arc::new(PredicateEntry::Tabled(StaticCode::new(key, clauses), table)),
        );

        Ok(())
    }
}
