//! The iteration protocol driver.
//!
//! One `IteratorRecord` per acquisition; every consumer (`for…of`, spread,
//! array destructuring, `yield*`) pairs the acquisition with a guaranteed
//! `IteratorClose` on every exit path, preserving an already-pending error
//! over any failure thrown by `return()`.

use crate::{
    error::{ErrorKind, RunError, RunResult},
    intern::{StaticStrings, SymbolId},
    interp::Interp,
    io::ConsoleWriter,
    object::PropertyKeyRef,
    resource::ResourceTracker,
    span::SourceSpan,
    tracer::EvalTracer,
    value::Value,
};

/// A live iterator: the iterator object plus its cached `next` method.
#[derive(Debug, Clone, Copy)]
pub(crate) struct IteratorRecord {
    pub iterator: Value,
    pub next_method: Value,
    /// True when the iterator came from `@@asyncIterator` and every step
    /// result is a promise.
    pub is_async: bool,
}

impl<T: ResourceTracker, C: ConsoleWriter, Tr: EvalTracer> Interp<'_, '_, T, C, Tr> {
    /// GetIterator: `@@iterator` (or `@@asyncIterator` with a sync
    /// fallback) called on the iterable.
    pub fn get_iterator(&mut self, value: Value, is_async: bool, span: SourceSpan) -> RunResult<IteratorRecord> {
        let mut actually_async = false;
        let method = if is_async {
            match self.get_method(value, PropertyKeyRef::Symbol(SymbolId::ASYNC_ITERATOR), span)? {
                Some(method) => {
                    actually_async = true;
                    Some(method)
                }
                None => self.get_method(value, PropertyKeyRef::Symbol(SymbolId::ITERATOR), span)?,
            }
        } else {
            self.get_method(value, PropertyKeyRef::Symbol(SymbolId::ITERATOR), span)?
        };
        let Some(method) = method else {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                format!("{} is not iterable", self.display_value(value, false, 2)),
                span,
            ));
        };
        let iterator = self.call_value(method, value, vec![], None, span)?;
        if !matches!(iterator, Value::Ref(id) if self.heap.object(id).is_some()) {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Result of the Symbol.iterator method is not an object",
                span,
            ));
        }
        let next_method = self.get_property(iterator, PropertyKeyRef::String(StaticStrings::Next.as_str()), span)?;
        Ok(IteratorRecord {
            iterator,
            next_method,
            is_async: actually_async,
        })
    }

    /// IteratorNext + IteratorComplete/IteratorValue in one step.
    ///
    /// Returns `(value, done)`. The step result must be an object carrying
    /// `value`/`done`, otherwise the protocol is violated.
    pub fn iterator_next(
        &mut self,
        record: &IteratorRecord,
        arg: Option<Value>,
        span: SourceSpan,
    ) -> RunResult<(Value, bool)> {
        let args = match arg {
            Some(arg) => vec![arg],
            None => vec![],
        };
        let result = self.call_value(record.next_method, record.iterator, args, None, span)?;
        self.iterator_step_result(result, span)
    }

    /// Validates and unpacks an iterator step result object.
    pub fn iterator_step_result(&mut self, result: Value, span: SourceSpan) -> RunResult<(Value, bool)> {
        if !matches!(result, Value::Ref(id) if self.heap.object(id).is_some()) {
            return Err(RunError::raise_at(
                ErrorKind::TypeError,
                "Iterator result is not an object",
                span,
            ));
        }
        let done = self.get_property(result, PropertyKeyRef::String(StaticStrings::Done.as_str()), span)?;
        let value = self.get_property(result, PropertyKeyRef::String(StaticStrings::Value.as_str()), span)?;
        Ok((value, done.truthy(self.heap, self.interns)))
    }

    /// IteratorClose: invokes `return()` when present. Errors from
    /// `return()` propagate on this (normal-completion) path; callers with a
    /// pending error use `close_iterator_on_error` instead, which keeps the
    /// original error.
    pub fn iterator_close(&mut self, record: &IteratorRecord, span: SourceSpan) -> RunResult<()> {
        let return_method = match self.get_method(
            record.iterator,
            PropertyKeyRef::String(StaticStrings::Return.as_str()),
            span,
        ) {
            Ok(method) => method,
            Err(err) => return Err(err),
        };
        if let Some(return_method) = return_method {
            self.call_value(return_method, record.iterator, vec![], None, span)?;
        }
        Ok(())
    }
}
