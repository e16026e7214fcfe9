//! Connection
//!
//! Explicit handle binding a backend client to a transaction stack. Each
//! caller owns its connection; concurrent callers create their own over
//! the same shared client.

use std::fmt;
use std::sync::Arc;

use crate::client::{DatastoreClient, TransactionId};
use crate::codec::EntityCodec;
use crate::config::Config;
use crate::transaction::{RetryPolicy, TransactionContext};

/// One entry of the transaction stack
#[derive(Debug)]
pub(crate) enum Frame {
    /// A remote transaction opened by this scope
    Transaction(TransactionContext),
    /// A nested scope reusing the enclosing transaction
    Joined,
    /// A `non_atomic` scope hiding any enclosing transaction
    Suspended,
}

pub struct Connection {
    client: Arc<dyn DatastoreClient>,
    config: Config,
    codec: EntityCodec,
    retry: RetryPolicy,
    pub(crate) stack: Vec<Frame>,
}

impl Connection {
    pub fn new(client: Arc<dyn DatastoreClient>, config: Config) -> Self {
        let codec = EntityCodec::new(config.namespace.clone());
        let retry = RetryPolicy::from_config(&config);
        Self {
            client,
            config,
            codec,
            retry,
            stack: Vec::new(),
        }
    }

    /// A second connection over the same client, with its own empty
    /// transaction stack
    pub fn fork(&self) -> Self {
        Self::new(Arc::clone(&self.client), self.config.clone())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn codec(&self) -> &EntityCodec {
        &self.codec
    }

    pub fn client(&self) -> &Arc<dyn DatastoreClient> {
        &self.client
    }

    pub fn namespace(&self) -> &str {
        &self.config.namespace
    }

    pub(crate) fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    /// Number of open `atomic`/`non_atomic` scopes
    pub fn transaction_depth(&self) -> usize {
        self.stack.len()
    }

    /// The transaction writes currently go to, if any
    pub(crate) fn current(&self) -> Option<&TransactionContext> {
        for frame in self.stack.iter().rev() {
            match frame {
                Frame::Transaction(context) => return Some(context),
                Frame::Joined => continue,
                Frame::Suspended => return None,
            }
        }
        None
    }

    pub(crate) fn current_mut(&mut self) -> Option<&mut TransactionContext> {
        for frame in self.stack.iter_mut().rev() {
            match frame {
                Frame::Transaction(context) => return Some(context),
                Frame::Joined => continue,
                Frame::Suspended => return None,
            }
        }
        None
    }

    pub fn current_transaction(&self) -> Option<TransactionId> {
        self.current().map(TransactionContext::id)
    }

    pub fn in_atomic_block(&self) -> bool {
        self.current().is_some()
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("project", &self.config.project)
            .field("namespace", &self.config.namespace)
            .field("depth", &self.stack.len())
            .field("transaction", &self.current_transaction())
            .finish()
    }
}
