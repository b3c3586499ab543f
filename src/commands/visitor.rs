//! Command visitor.

use crate::commands::write::{
    ClearCommand, EvictCommand, ExpireCommand, PutKeyValueCommand, PutMapCommand, RemoveCommand,
};
use crate::commands::InvocationContext;

/// Per-variant callbacks reached through [`Command::accept_visitor`].
///
/// Lets code that only sees a [`Command`] react to the concrete variant,
/// e.g. an interceptor's post-hook, without matching on the enum itself.
///
/// [`Command`]: crate::commands::Command
/// [`Command::accept_visitor`]: crate::commands::Command::accept_visitor
pub trait Visitor<K, V> {
    type Output;

    fn visit_put_key_value(
        &self,
        ctx: &InvocationContext<K, V>,
        command: &PutKeyValueCommand<K, V>,
    ) -> Self::Output;

    fn visit_put_map(&self, ctx: &InvocationContext<K, V>, command: &PutMapCommand<K, V>) -> Self::Output;

    fn visit_remove(&self, ctx: &InvocationContext<K, V>, command: &RemoveCommand<K, V>) -> Self::Output;

    fn visit_evict(&self, ctx: &InvocationContext<K, V>, command: &EvictCommand<K, V>) -> Self::Output;

    fn visit_expire(&self, ctx: &InvocationContext<K, V>, command: &ExpireCommand<K, V>) -> Self::Output;

    fn visit_clear(&self, ctx: &InvocationContext<K, V>, command: &ClearCommand<K, V>) -> Self::Output;
}
