//! Sub-message dispatch: the sandbox each returned message runs in, the
//! commit/discard rules, gas caps, and the redacted reply fed back to the
//! contract.

use tracing::debug;

use ember_types::primitives::{address_display, Address};
use ember_types::response::{Reply, ReplyOn, SubMsg, SubMsgKind, SubMsgResponse, SubMsgResult};

use crate::bank;
use crate::context::TxContext;
use crate::error::{redact_error, KilnError};
use crate::keeper::Kiln;

impl Kiln {
    /// Process the sub-messages of a contract response. The reply's payload,
    /// when any, replaces the original response data.
    pub(crate) fn handle_response_messages(
        &self,
        ctx: &TxContext,
        contract: &Address,
        msgs: Vec<SubMsg>,
        data: Vec<u8>,
    ) -> Result<Vec<u8>, KilnError> {
        if msgs.is_empty() {
            return Ok(data);
        }
        match self.dispatch_submessages(ctx, contract, msgs)? {
            Some(reply_data) => Ok(reply_data),
            None => Ok(data),
        }
    }

    /// Dispatch messages in order, each in its own cache context.
    ///
    /// On success the child's writes merge upward and its events re-emit
    /// after the parent's pre-call events; on failure both are discarded and
    /// the parent is charged only what the child actually consumed.
    fn dispatch_submessages(
        &self,
        ctx: &TxContext,
        contract: &Address,
        msgs: Vec<SubMsg>,
    ) -> Result<Option<Vec<u8>>, KilnError> {
        if ctx.depth() >= crate::context::MAX_CALL_DEPTH {
            return Err(KilnError::ExecuteFailed(format!(
                "call depth exceeded: {}",
                crate::context::MAX_CALL_DEPTH
            )));
        }
        let mut reply_data = None;
        for msg in msgs {
            let gas_remaining = ctx.gas_remaining();
            let capped = msg.gas_limit.filter(|limit| *limit < gas_remaining);

            let child = match capped {
                Some(limit) => ctx.child_with_gas(limit),
                None => ctx.child(),
            };

            let mut result = self.dispatch_submsg(&child.ctx, contract, &msg.msg);

            if let Some(limit) = capped {
                let spent = child.ctx.gas_consumed().min(limit);
                ctx.consume_gas(spent, "from limited sub-message")?;
                if matches!(result, Err(KilnError::OutOfGas { .. })) {
                    // The sub-call ran over its own cap: charged exactly the
                    // cap, converted into a recoverable failure.
                    result = Err(KilnError::ExecuteFailed(
                        "sub-message hit gas limit".to_string(),
                    ));
                }
            } else if let Err(KilnError::OutOfGas { .. }) = &result {
                // No explicit cap: exhaustion unwinds to the transaction
                // boundary.
                return Err(result.unwrap_err());
            }

            let events = child.ctx.events();
            match &result {
                Ok(_) => child.commit(ctx)?,
                Err(err) => {
                    debug!(error = %err, "sub-message failed; discarding its context");
                }
            }

            // Short-circuit the cases that never reach the reply entry point.
            if matches!(msg.reply_on, ReplyOn::Success | ReplyOn::Never) {
                if let Err(err) = &result {
                    return Err(err.clone());
                }
            }
            if matches!(msg.reply_on, ReplyOn::Never)
                || (matches!(msg.reply_on, ReplyOn::Error) && result.is_ok())
            {
                continue;
            }

            let reply = Reply {
                id: msg.id,
                result: match result {
                    Ok(response_data) => SubMsgResult::Ok(SubMsgResponse {
                        events,
                        data: response_data,
                    }),
                    Err(err) => {
                        debug!(cause = %err, "redacting sub-message error");
                        SubMsgResult::Err(redact_error(&err))
                    }
                },
            };

            // The reply runs on the parent context and aborts on error.
            let rsp = self
                .reply(ctx, contract, &reply)
                .map_err(|e| KilnError::ExecuteFailed(format!("reply: {e}")))?;
            if !rsp.is_empty() {
                reply_data = Some(rsp);
            }
        }
        Ok(reply_data)
    }

    fn dispatch_submsg(
        &self,
        ctx: &TxContext,
        contract: &Address,
        kind: &SubMsgKind,
    ) -> Result<Vec<u8>, KilnError> {
        match kind {
            SubMsgKind::Bank { to, amount } => {
                bank::transfer_coins(ctx, contract, to, amount)?;
                Ok(Vec::new())
            }
            SubMsgKind::Execute {
                contract: target,
                msg,
                funds,
            } => self.execute(ctx, target, contract, msg, funds, &[], false),
            SubMsgKind::Instantiate {
                code_id,
                msg,
                funds,
                label,
            } => {
                let (address, data) =
                    self.instantiate(ctx, *code_id, contract, msg, funds, label.clone())?;
                debug!(address = %address_display(&address), "sub-message instantiated contract");
                Ok(data)
            }
        }
    }
}
