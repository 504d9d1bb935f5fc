use std::{future::Future, pin::Pin, sync::Arc};

use tokio::task::JoinHandle;

use crate::events::{
    CommissionEarnedEvent,
    EventHandler,
    EventProducer,
    Handler,
    LedgerAdjustedEvent,
    PayoutCompletedEvent,
    TransactionStatusChangedEvent,
};

type HookFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default, Clone)]
pub struct EventProducers {
    pub commission_earned_producer: Vec<EventProducer<CommissionEarnedEvent>>,
    pub payout_completed_producer: Vec<EventProducer<PayoutCompletedEvent>>,
    pub ledger_adjusted_producer: Vec<EventProducer<LedgerAdjustedEvent>>,
    pub status_changed_producer: Vec<EventProducer<TransactionStatusChangedEvent>>,
}

pub struct EventHandlers {
    pub on_commission_earned: Option<EventHandler<CommissionEarnedEvent>>,
    pub on_payout_completed: Option<EventHandler<PayoutCompletedEvent>>,
    pub on_ledger_adjusted: Option<EventHandler<LedgerAdjustedEvent>>,
    pub on_status_changed: Option<EventHandler<TransactionStatusChangedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        Self {
            on_commission_earned: hooks.on_commission_earned.map(|f| EventHandler::new(buffer_size, f)),
            on_payout_completed: hooks.on_payout_completed.map(|f| EventHandler::new(buffer_size, f)),
            on_ledger_adjusted: hooks.on_ledger_adjusted.map(|f| EventHandler::new(buffer_size, f)),
            on_status_changed: hooks.on_status_changed.map(|f| EventHandler::new(buffer_size, f)),
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_commission_earned {
            result.commission_earned_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_payout_completed {
            result.payout_completed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_ledger_adjusted {
            result.ledger_adjusted_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_status_changed {
            result.status_changed_producer.push(handler.subscribe());
        }
        result
    }

    /// Spawns a task per registered hook. Each task ends once all producers for it have been dropped and its in-flight
    /// hooks have finished, so awaiting the returned handles after dropping the producers drains every event.
    pub async fn start_handlers(self) -> Vec<JoinHandle<()>> {
        let mut tasks = Vec::with_capacity(4);
        if let Some(handler) = self.on_commission_earned {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_payout_completed {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_ledger_adjusted {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        if let Some(handler) = self.on_status_changed {
            tasks.push(tokio::spawn(handler.start_handler()));
        }
        tasks
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_commission_earned: Option<Handler<CommissionEarnedEvent>>,
    pub on_payout_completed: Option<Handler<PayoutCompletedEvent>>,
    pub on_ledger_adjusted: Option<Handler<LedgerAdjustedEvent>>,
    pub on_status_changed: Option<Handler<TransactionStatusChangedEvent>>,
}

impl EventHooks {
    pub fn on_commission_earned<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(CommissionEarnedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_commission_earned = Some(Arc::new(f));
        self
    }

    pub fn on_payout_completed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(PayoutCompletedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_payout_completed = Some(Arc::new(f));
        self
    }

    pub fn on_ledger_adjusted<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(LedgerAdjustedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_ledger_adjusted = Some(Arc::new(f));
        self
    }

    pub fn on_status_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionStatusChangedEvent) -> HookFuture) + Send + Sync + 'static {
        self.on_status_changed = Some(Arc::new(f));
        self
    }
}
