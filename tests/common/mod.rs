//! Shared fixtures: a todo-list store and a minimal host that renders and
//! commits bindings, recording what it rendered.

#![allow(dead_code)]

use parking_lot::Mutex;
use statewire::{Binding, ShallowEq, Store, StoreConfig};
use std::sync::Arc;

#[derive(Clone, Debug, PartialEq)]
pub struct Todo {
    pub id: String,
    pub done: bool,
}

#[derive(Clone, Debug)]
pub struct TodoState {
    pub todos: Arc<Vec<Todo>>,
    pub filter: Arc<str>,
}

pub enum TodoAction {
    Add(&'static str),
    Delete(&'static str),
    Toggle(&'static str),
    SetFilter(&'static str),
    Noop,
}

pub fn todo(id: &str) -> Todo {
    Todo {
        id: id.to_string(),
        done: false,
    }
}

pub fn todo_reducer(state: &Arc<TodoState>, action: &TodoAction) -> Arc<TodoState> {
    match action {
        TodoAction::Add(id) => {
            let mut todos = (*state.todos).clone();
            todos.push(todo(id));
            Arc::new(TodoState {
                todos: Arc::new(todos),
                filter: state.filter.clone(),
            })
        }
        TodoAction::Delete(id) => Arc::new(TodoState {
            todos: Arc::new(state.todos.iter().filter(|t| t.id != *id).cloned().collect()),
            filter: state.filter.clone(),
        }),
        TodoAction::Toggle(id) => Arc::new(TodoState {
            todos: Arc::new(
                state
                    .todos
                    .iter()
                    .map(|t| Todo {
                        id: t.id.clone(),
                        done: if t.id == *id { !t.done } else { t.done },
                    })
                    .collect(),
            ),
            filter: state.filter.clone(),
        }),
        TodoAction::SetFilter(filter) => Arc::new(TodoState {
            todos: state.todos.clone(),
            filter: (*filter).into(),
        }),
        TodoAction::Noop => Arc::clone(state),
    }
}

pub fn initial_todos() -> TodoState {
    TodoState {
        todos: Arc::new(vec![todo("a"), todo("b")]),
        filter: "all".into(),
    }
}

pub fn todo_store() -> Store<TodoState, TodoAction> {
    Store::new(todo_reducer, initial_todos())
}

pub fn todo_store_with(config: StoreConfig) -> Store<TodoState, TodoAction> {
    Store::with_config(todo_reducer, initial_todos(), config)
}

// --- Host ---

/// Names of rendered components, in render order.
#[derive(Clone, Default)]
pub struct RenderLog(Arc<Mutex<Vec<String>>>);

impl RenderLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, name: &str) {
        self.0.lock().push(name.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().iter().filter(|n| *n == name).count()
    }

    pub fn clear(&self) {
        self.0.lock().clear();
    }
}

/// A host renderer: log, re-evaluate with the latest own props, commit.
pub fn render_and_commit<O, P>(
    name: &'static str,
    log: &RenderLog,
) -> impl Fn(&Binding<TodoState, TodoAction, O, P>) + Send + Sync + 'static
where
    O: Clone + Send + 'static,
    P: ShallowEq + Clone + Send + 'static,
{
    let log = log.clone();
    move |binding: &Binding<TodoState, TodoAction, O, P>| {
        log.push(name);
        binding.rerender().expect("render failed");
        binding.commit();
    }
}

/// Route library logs to the test output. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::TRACE)
        .try_init();
}
