//! End-to-end lifecycle tests: store code, instantiate, execute, query,
//! reply, sub-messages and pinning, exercised against both runtime backends.

use std::sync::Arc;

use ember_crypto::address::{build_contract_address_classic, build_contract_address_salted};
use ember_crypto::hash::checksum;
use ember_forge::{RuntimeBackend, WasmiBackend, WasmtimeBackend};
use ember_kiln::accounts::{self, Account};
use ember_kiln::bank;
use ember_kiln::context::TxContext;
use ember_kiln::gas::{GasConfig, GasRegister, DEFAULT_INSTANCE_COST};
use ember_kiln::{HostCtx, Kiln, KilnConfig, KilnError};
use ember_storage::StoreSpaces;
use ember_types::coin::Coin;
use ember_types::contract::CodeMetadata;
use ember_types::env::BlockInfo;
use ember_types::primitives::Address;
use ember_types::response::{ReplyOn, SubMsg, SubMsgKind};
use ember_types::system;

/// Key-value test contract speaking the ember_env_1 interface.
///
/// execute dispatches on the first calldata byte:
///   1: store the rest under "key" and return it
///   2: revert with the rest as payload
///   3: store "before"="done", submit the rest as a JSON sub-message
///   5: cross-contract call to the 20-byte address in the rest
///   other/empty: echo the calldata
const KV_WAT: &str = r#"
(module
  (import "ember_env_1" "calldata_length" (func $cd_len (result i32)))
  (import "ember_env_1" "calldata_copy" (func $cd_copy (param i32 i32 i32)))
  (import "ember_env_1" "storage_load" (func $sload (param i32 i32 i32 i32) (result i32)))
  (import "ember_env_1" "storage_store" (func $sstore (param i32 i32 i32 i32)))
  (import "ember_env_1" "finish" (func $finish (param i32 i32)))
  (import "ember_env_1" "revert" (func $revert (param i32 i32)))
  (import "ember_env_1" "emit_attribute" (func $attr (param i32 i32 i32 i32)))
  (import "ember_env_1" "submit_msg" (func $submit (param i32 i32)))
  (import "ember_env_1" "call" (func $call (param i64 i32 i32 i32 i32) (result i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "init")
  (data (i32.const 8) "done")
  (data (i32.const 16) "key")
  (data (i32.const 32) "reply")
  (data (i32.const 40) "before")
  (data (i32.const 48) "qside")
  (data (i32.const 64) "action")
  (data (i32.const 72) "instantiate")

  (func (export "instantiate")
    (call $sstore (i32.const 0) (i32.const 4) (i32.const 8) (i32.const 4))
    (call $attr (i32.const 64) (i32.const 6) (i32.const 72) (i32.const 11))
    (call $finish (i32.const 8) (i32.const 4))
  )

  (func (export "execute")
    (local $len i32)
    (local $op i32)
    (local $r i32)
    (local.set $len (call $cd_len))
    (if (i32.eqz (local.get $len))
      (then
        (call $finish (i32.const 0) (i32.const 0))
        (return)))
    (call $cd_copy (i32.const 1024) (i32.const 0) (local.get $len))
    (local.set $op (i32.load8_u (i32.const 1024)))
    (if (i32.eq (local.get $op) (i32.const 1))
      (then
        (call $sstore (i32.const 16) (i32.const 3)
          (i32.const 1025) (i32.sub (local.get $len) (i32.const 1)))
        (call $finish (i32.const 1025) (i32.sub (local.get $len) (i32.const 1)))
        (return)))
    (if (i32.eq (local.get $op) (i32.const 2))
      (then
        (call $revert (i32.const 1025) (i32.sub (local.get $len) (i32.const 1)))
        (return)))
    (if (i32.eq (local.get $op) (i32.const 3))
      (then
        (call $sstore (i32.const 40) (i32.const 6) (i32.const 8) (i32.const 4))
        (call $submit (i32.const 1025) (i32.sub (local.get $len) (i32.const 1)))
        (call $finish (i32.const 0) (i32.const 0))
        (return)))
    (if (i32.eq (local.get $op) (i32.const 5))
      (then
        (local.set $r
          (call $call (i64.const 0) (i32.const 1025) (i32.const 512)
            (i32.const 0) (i32.const 0)))
        (i32.store (i32.const 2048) (local.get $r))
        (call $finish (i32.const 2048) (i32.const 4))
        (return)))
    (call $finish (i32.const 1024) (local.get $len))
  )

  (func (export "query")
    (local $n i32)
    (call $sstore (i32.const 48) (i32.const 5) (i32.const 8) (i32.const 4))
    (local.set $n
      (call $sload (i32.const 16) (i32.const 3) (i32.const 2048) (i32.const 256)))
    (if (i32.lt_s (local.get $n) (i32.const 0))
      (then
        (call $finish (i32.const 0) (i32.const 0))
        (return)))
    (call $finish (i32.const 2048) (local.get $n))
  )

  (func (export "reply")
    (local $len i32)
    (local.set $len (call $cd_len))
    (call $cd_copy (i32.const 1024) (i32.const 0) (local.get $len))
    (call $sstore (i32.const 32) (i32.const 5) (i32.const 1024) (local.get $len))
    (call $finish (i32.const 0) (i32.const 0))
  )
)
"#;

/// A contract that writes then reverts on execute.
const REVERTER_WAT: &str = r#"
(module
  (import "ember_env_1" "storage_store" (func $sstore (param i32 i32 i32 i32)))
  (import "ember_env_1" "revert" (func $revert (param i32 i32)))
  (memory (export "memory") 1)
  (data (i32.const 0) "sub")
  (data (i32.const 4) "x")
  (data (i32.const 8) "boom")
  (func (export "instantiate"))
  (func (export "execute")
    (call $sstore (i32.const 0) (i32.const 3) (i32.const 4) (i32.const 1))
    (call $revert (i32.const 8) (i32.const 4))
  )
  (func (export "query"))
)
"#;

/// A stand-in dialect interpreter: every entry point echoes the interpreted
/// bytecode from the environment.
const INTERP_WAT: &str = r#"
(module
  (import "ember_env_1" "bytecode_length" (func $bc_len (result i32)))
  (import "ember_env_1" "bytecode_copy" (func $bc_copy (param i32 i32 i32)))
  (import "ember_env_1" "finish" (func $finish (param i32 i32)))
  (memory (export "memory") 1)
  (func $echo
    (local $len i32)
    (local.set $len (call $bc_len))
    (call $bc_copy (i32.const 1024) (i32.const 0) (local.get $len))
    (call $finish (i32.const 1024) (local.get $len))
  )
  (func (export "instantiate") (call $echo))
  (func (export "execute") (call $echo))
  (func (export "query") (call $echo))
)
"#;

const CREATOR: Address = [0x11u8; 20];

struct Harness {
    kiln: Kiln,
    spaces: StoreSpaces,
    _home: tempfile::TempDir,
}

fn block() -> BlockInfo {
    BlockInfo {
        height: 7,
        timestamp: 1_700_000_000_000_000_000,
        gas_limit: 30_000_000,
        hash: vec![0xab; 32],
        proposer: [0u8; 20],
    }
}

impl Harness {
    fn new(backend: Arc<dyn RuntimeBackend<HostCtx>>) -> Self {
        Self::with_gas_register(backend, GasRegister::default())
    }

    fn with_gas_register(backend: Arc<dyn RuntimeBackend<HostCtx>>, gas: GasRegister) -> Self {
        let home = tempfile::tempdir().unwrap();
        let kiln = Kiln::new(backend, KilnConfig::new(home.path()), gas).unwrap();
        let spaces = StoreSpaces::in_memory();
        let ctx = TxContext::new(spaces.clone(), block(), None, 0);
        kiln.init_genesis(&ctx).unwrap();
        Self {
            kiln,
            spaces,
            _home: home,
        }
    }

    fn wasmtime() -> Self {
        Self::new(Arc::new(WasmtimeBackend::new().unwrap()))
    }

    fn wasmi() -> Self {
        Self::new(Arc::new(WasmiBackend::new().unwrap()))
    }

    fn ctx(&self) -> TxContext {
        TxContext::new(self.spaces.clone(), block(), None, 0)
    }

    fn ctx_with_gas(&self, limit: u64) -> TxContext {
        TxContext::new(self.spaces.clone(), block(), None, limit)
    }

    fn store_kv_contract(&self, ctx: &TxContext) -> (u64, Address) {
        let code = wat::parse_str(KV_WAT).unwrap();
        let (code_id, _) = self
            .kiln
            .create(ctx, &CREATOR, code, &[], CodeMetadata::default(), false, false)
            .unwrap();
        let (addr, _) = self
            .kiln
            .instantiate(ctx, code_id, &CREATOR, &[], &vec![], "kv")
            .unwrap();
        (code_id, addr)
    }
}

// ─── Create & instantiate ───────────────────────────────────────────────────

#[test]
fn test_create_and_instantiate_scenario() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let code = wat::parse_str(KV_WAT).unwrap();
    let expected_checksum = checksum(&code);

    let (code_id, code_hash) = h
        .kiln
        .create(&ctx, &CREATOR, code, &[], CodeMetadata::default(), false, false)
        .unwrap();
    assert_eq!(code_id, 1);
    assert_eq!(code_hash, expected_checksum);

    let (addr, data) = h
        .kiln
        .instantiate(&ctx, code_id, &CREATOR, &[], &vec![], "kv")
        .unwrap();
    // Fresh creator account: first derivation uses sequence 0.
    assert_eq!(addr, build_contract_address_classic(&CREATOR, 0));
    assert_eq!(data, b"done");

    let info = h.kiln.get_contract_info(&ctx, &addr).unwrap().unwrap();
    assert_eq!(info.code_id, 1);
    assert_eq!(info.creator, CREATOR);

    // The constructor ran: its storage write and module event are visible.
    assert_eq!(
        h.kiln.query_raw(&ctx, &addr, b"init").unwrap(),
        Some(b"done".to_vec())
    );
    let events = ctx.events();
    assert!(events.iter().any(|e| e.ty == system::EVENT_TYPE_STORE_CODE));
    assert!(events.iter().any(|e| e.ty == system::EVENT_TYPE_INSTANTIATE));
    assert!(events.iter().any(|e| {
        e.ty == system::MODULE_EVENT_TYPE
            && e.attributes
                .iter()
                .any(|a| a.key == "action" && a.value == "instantiate")
    }));
}

#[test]
fn test_create_is_idempotent_on_checksum() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let code = wat::parse_str(KV_WAT).unwrap();
    let (id_a, sum_a) = h
        .kiln
        .create(&ctx, &CREATOR, code.clone(), &[], CodeMetadata::default(), false, false)
        .unwrap();
    let (id_b, sum_b) = h
        .kiln
        .create(&ctx, &CREATOR, code, &[], CodeMetadata::default(), false, false)
        .unwrap();
    // Same bytes collapse to the same checksum; ids keep increasing.
    assert_eq!(sum_a, sum_b);
    assert_eq!((id_a, id_b), (1, 2));
}

#[test]
fn test_create_gzip_framed() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let code = wat::parse_str(KV_WAT).unwrap();
    let packed = ember_kiln::compress::gzip(&code).unwrap();
    let (_, code_hash) = h
        .kiln
        .create(&ctx, &CREATOR, packed, &[], CodeMetadata::default(), false, false)
        .unwrap();
    // Checksum is taken over the decompressed bytes.
    assert_eq!(code_hash, checksum(&code));
}

#[test]
fn test_create_rejects_garbage() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let err = h
        .kiln
        .create(
            &ctx,
            &CREATOR,
            b"not wasm at all".to_vec(),
            &[],
            CodeMetadata::default(),
            false,
            false,
        )
        .unwrap_err();
    assert!(matches!(err, KilnError::CreateFailed(_)));
}

#[test]
fn test_classic_addresses_differ_across_instantiations() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (code_id, addr_a) = h.store_kv_contract(&ctx);
    let (addr_b, _) = h
        .kiln
        .instantiate(&ctx, code_id, &CREATOR, &[], &vec![], "kv-2")
        .unwrap();
    assert_ne!(addr_a, addr_b);
    assert_eq!(addr_b, build_contract_address_classic(&CREATOR, 1));

    // The nonce coupling: derivation bumped the creator's sequence twice.
    let account = accounts::get_account(&ctx, &CREATOR).unwrap().unwrap();
    assert_eq!(account.sequence, 2);
}

#[test]
fn test_instantiate2_is_deterministic_and_duplicate_protected() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let code = wat::parse_str(KV_WAT).unwrap();
    let (code_id, code_hash) = h
        .kiln
        .create(&ctx, &CREATOR, code, &[], CodeMetadata::default(), false, false)
        .unwrap();

    let salt = [0x42u8; 32];
    let (addr, _) = h
        .kiln
        .instantiate2(&ctx, code_id, &CREATOR, &[], &vec![], &salt, false, "kv")
        .unwrap();
    assert_eq!(addr, build_contract_address_salted(&CREATOR, &salt, &code_hash));

    let err = h
        .kiln
        .instantiate2(&ctx, code_id, &CREATOR, &[], &vec![], &salt, false, "kv")
        .unwrap_err();
    assert!(matches!(err, KilnError::Duplicate(_)));

    let other = [0x43u8; 32];
    let (addr_b, _) = h
        .kiln
        .instantiate2(&ctx, code_id, &CREATOR, &[], &vec![], &other, false, "kv")
        .unwrap();
    assert_ne!(addr, addr_b);
}

#[test]
fn test_instantiate_funds_move_before_constructor() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let code = wat::parse_str(KV_WAT).unwrap();
    let (code_id, _) = h
        .kiln
        .create(&ctx, &CREATOR, code, &[], CodeMetadata::default(), false, false)
        .unwrap();

    bank::mint_coins(&ctx, &CREATOR, &[Coin::new(1_000, "ember")]).unwrap();
    let funds = vec![Coin::new(250, "ember")];
    let (addr, _) = h
        .kiln
        .instantiate(&ctx, code_id, &CREATOR, &[], &funds, "funded")
        .unwrap();
    assert_eq!(bank::get_balance(&ctx, &addr, "ember").unwrap(), 250);
    assert_eq!(bank::get_balance(&ctx, &CREATOR, "ember").unwrap(), 750);
}

#[test]
fn test_instantiate_rejects_claimed_account() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let code = wat::parse_str(KV_WAT).unwrap();
    let (code_id, _) = h
        .kiln
        .create(&ctx, &CREATOR, code, &[], CodeMetadata::default(), false, false)
        .unwrap();

    // Claim the address the next classic derivation will produce.
    let future_addr = build_contract_address_classic(&CREATOR, 0);
    accounts::set_account(
        &ctx,
        &future_addr,
        &Account {
            sequence: 9,
            has_pubkey: false,
        },
    )
    .unwrap();

    let err = h
        .kiln
        .instantiate(&ctx, code_id, &CREATOR, &[], &vec![], "kv")
        .unwrap_err();
    assert!(matches!(err, KilnError::AccountExists(_)));
}

// ─── Execute & query ────────────────────────────────────────────────────────

#[test]
fn test_execute_stores_and_returns() {
    for h in [Harness::wasmtime(), Harness::wasmi()] {
        let ctx = h.ctx();
        let (_, addr) = h.store_kv_contract(&ctx);

        let mut msg = vec![1u8];
        msg.extend_from_slice(b"hello");
        let data = h
            .kiln
            .execute(&ctx, &addr, &CREATOR, &msg, &vec![], &[], false)
            .unwrap();
        assert_eq!(data, b"hello");
        assert_eq!(
            h.kiln.query_raw(&ctx, &addr, b"key").unwrap(),
            Some(b"hello".to_vec())
        );
    }
}

#[test]
fn test_execute_revert_propagates_payload() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, addr) = h.store_kv_contract(&ctx);

    let mut msg = vec![2u8];
    msg.extend_from_slice(b"bad input");
    let err = h
        .kiln
        .execute(&ctx, &addr, &CREATOR, &msg, &vec![], &[], false)
        .unwrap_err();
    match err {
        KilnError::ExecuteFailed(reason) => assert!(reason.contains("bad input")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn test_execute_bare_account_transfer_compat() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let eoa: Address = [0x77u8; 20];

    // Zero funds to a non-contract address: silent no-op.
    let data = h
        .kiln
        .execute(&ctx, &eoa, &CREATOR, b"ignored", &vec![], &[], false)
        .unwrap();
    assert!(data.is_empty());

    // Non-zero funds: a plain value transfer.
    bank::mint_coins(&ctx, &CREATOR, &[Coin::new(50, "ember")]).unwrap();
    h.kiln
        .execute(
            &ctx,
            &eoa,
            &CREATOR,
            b"",
            &vec![Coin::new(50, "ember")],
            &[],
            false,
        )
        .unwrap();
    assert_eq!(bank::get_balance(&ctx, &eoa, "ember").unwrap(), 50);
}

#[test]
fn test_query_reads_without_committing_writes() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, addr) = h.store_kv_contract(&ctx);

    let mut msg = vec![1u8];
    msg.extend_from_slice(b"stored-value");
    h.kiln
        .execute(&ctx, &addr, &CREATOR, &msg, &vec![], &[], false)
        .unwrap();

    let result = h.kiln.query(&ctx, &addr, &CREATOR, &[], &[]).unwrap();
    assert_eq!(result, b"stored-value");

    // The query entry point issued a storage write; it must not be
    // observable by later queries or executes.
    assert_eq!(h.kiln.query_raw(&ctx, &addr, b"qside").unwrap(), None);
    let again = h.kiln.query(&ctx, &addr, &CREATOR, &[], &[]).unwrap();
    assert_eq!(again, b"stored-value");
}

#[test]
fn test_query_debug_gated_and_returns_memory() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, addr) = h.store_kv_contract(&ctx);

    let (_, snapshot) = h
        .kiln
        .query_debug(&ctx, &addr, &CREATOR, &[], &[])
        .unwrap();
    // One page of linear memory.
    assert_eq!(snapshot.len(), 64 * 1024);

    // A contract caller is rejected: non-deterministic introspection must
    // not be reachable from consensus-critical execution.
    let err = h
        .kiln
        .query_debug(&ctx, &addr, &addr, &[], &[])
        .unwrap_err();
    assert!(matches!(err, KilnError::UnauthorizedAddress(_)));
}

#[test]
fn test_execute_with_origin_requires_contract_caller() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, addr) = h.store_kv_contract(&ctx);

    let err = h
        .kiln
        .execute_with_origin(&ctx, &CREATOR, &addr, &CREATOR, b"", &vec![])
        .unwrap_err();
    assert!(matches!(err, KilnError::ExecuteFailed(_)));
}

#[test]
fn test_cross_contract_call() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, caller_addr) = h.store_kv_contract(&ctx);
    let (code_id, _) = h.store_kv_contract(&ctx);
    let (target_addr, _) = h
        .kiln
        .instantiate(&ctx, code_id, &[0x22u8; 20], &[], &vec![], "target")
        .unwrap();

    let mut msg = vec![5u8];
    msg.extend_from_slice(&target_addr);
    let data = h
        .kiln
        .execute(&ctx, &caller_addr, &CREATOR, &msg, &vec![], &[], false)
        .unwrap();
    assert_eq!(data, 1u32.to_le_bytes());
}

#[test]
fn test_contract_cannot_call_system_contract() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, addr) = h.store_kv_contract(&ctx);

    let mut msg = vec![5u8];
    msg.extend_from_slice(&system::ADDR_ROLES);
    let data = h
        .kiln
        .execute(&ctx, &addr, &CREATOR, &msg, &vec![], &[], false)
        .unwrap();
    // The call host function reports failure instead of reaching the
    // privileged range.
    assert_eq!(data, 0u32.to_le_bytes());
}

// ─── Sub-messages & reply ───────────────────────────────────────────────────

#[test]
fn test_sub_call_rollback_and_reply() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, parent) = h.store_kv_contract(&ctx);

    let reverter_code = wat::parse_str(REVERTER_WAT).unwrap();
    let (rev_code_id, _) = h
        .kiln
        .create(
            &ctx,
            &CREATOR,
            reverter_code,
            &[],
            CodeMetadata::default(),
            false,
            false,
        )
        .unwrap();
    let (reverter, _) = h
        .kiln
        .instantiate(&ctx, rev_code_id, &CREATOR, &[], &vec![], "reverter")
        .unwrap();

    let submsg = SubMsg {
        id: 1,
        msg: SubMsgKind::Execute {
            contract: reverter,
            msg: vec![],
            funds: vec![],
        },
        gas_limit: None,
        reply_on: ReplyOn::Always,
    };
    let mut msg = vec![3u8];
    msg.extend_from_slice(&serde_json::to_vec(&submsg).unwrap());

    h.kiln
        .execute(&ctx, &parent, &CREATOR, &msg, &vec![], &[], false)
        .unwrap();

    // The parent's pre-dispatch write is retained.
    assert_eq!(
        h.kiln.query_raw(&ctx, &parent, b"before").unwrap(),
        Some(b"done".to_vec())
    );
    // The sub-message's writes are fully discarded.
    assert_eq!(h.kiln.query_raw(&ctx, &reverter, b"sub").unwrap(), None);
    // The reply entry point observed the redacted error.
    let reply = h.kiln.query_raw(&ctx, &parent, b"reply").unwrap().unwrap();
    let reply_text = String::from_utf8(reply).unwrap();
    assert!(reply_text.contains("Err"), "reply was: {reply_text}");
    assert!(
        reply_text.contains("codespace: kiln"),
        "sub-message error must be redacted: {reply_text}"
    );
}

#[test]
fn test_sub_call_success_commits_and_replies() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, parent) = h.store_kv_contract(&ctx);
    let (kv_code_id, _) = h.store_kv_contract(&ctx);
    let (target, _) = h
        .kiln
        .instantiate(&ctx, kv_code_id, &[0x33u8; 20], &[], &vec![], "target")
        .unwrap();

    let mut inner = vec![1u8];
    inner.extend_from_slice(b"from-sub");
    let submsg = SubMsg {
        id: 7,
        msg: SubMsgKind::Execute {
            contract: target,
            msg: inner,
            funds: vec![],
        },
        gas_limit: None,
        reply_on: ReplyOn::Always,
    };
    let mut msg = vec![3u8];
    msg.extend_from_slice(&serde_json::to_vec(&submsg).unwrap());
    h.kiln
        .execute(&ctx, &parent, &CREATOR, &msg, &vec![], &[], false)
        .unwrap();

    // The sub-call's write committed upward.
    assert_eq!(
        h.kiln.query_raw(&ctx, &target, b"key").unwrap(),
        Some(b"from-sub".to_vec())
    );
    let reply = h.kiln.query_raw(&ctx, &parent, b"reply").unwrap().unwrap();
    assert!(String::from_utf8(reply).unwrap().contains("Ok"));
}

#[test]
fn test_sub_call_error_aborts_parent_when_reply_on_success() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let (_, parent) = h.store_kv_contract(&ctx);

    // Bank sub-message the contract cannot afford.
    let submsg = SubMsg {
        id: 2,
        msg: SubMsgKind::Bank {
            to: [9u8; 20],
            amount: vec![Coin::new(1_000_000, "ember")],
        },
        gas_limit: None,
        reply_on: ReplyOn::Success,
    };
    let mut msg = vec![3u8];
    msg.extend_from_slice(&serde_json::to_vec(&submsg).unwrap());
    let err = h
        .kiln
        .execute(&ctx, &parent, &CREATOR, &msg, &vec![], &[], false)
        .unwrap_err();
    assert!(matches!(err, KilnError::InsufficientFunds { .. }), "{err:?}");
}

// ─── Gas ────────────────────────────────────────────────────────────────────

#[test]
fn test_gas_exhaustion_before_backend_invocation() {
    let h = Harness::wasmtime();
    let setup_ctx = h.ctx();
    let (_, addr) = h.store_kv_contract(&setup_ctx);

    let ctx = h.ctx_with_gas(DEFAULT_INSTANCE_COST - 1);
    let err = h
        .kiln
        .execute(&ctx, &addr, &CREATOR, &[], &vec![], &[], false)
        .unwrap_err();
    assert!(matches!(err, KilnError::OutOfGas { .. }), "{err:?}");
}

#[test]
fn test_gas_monotonic_in_message_length() {
    let gas = GasRegister::new(GasConfig {
        contract_message_data_cost: 2,
        ..GasConfig::default()
    });
    let h = Harness::with_gas_register(Arc::new(WasmtimeBackend::new().unwrap()), gas);
    let setup_ctx = h.ctx();
    let (_, addr) = h.store_kv_contract(&setup_ctx);

    let mut consumed = Vec::new();
    for len in [1usize, 16, 256] {
        let ctx = h.ctx_with_gas(10_000_000);
        let msg = vec![9u8; len];
        h.kiln
            .execute(&ctx, &addr, &CREATOR, &msg, &vec![], &[], false)
            .unwrap();
        consumed.push(ctx.gas_consumed());
    }
    assert!(consumed[0] < consumed[1]);
    assert!(consumed[1] < consumed[2]);
}

#[test]
fn test_infinite_loop_is_bounded_by_fuel() {
    let loop_wat = r#"
        (module
          (memory (export "memory") 1)
          (func (export "instantiate"))
          (func (export "execute") (loop $inf (br $inf)))
          (func (export "query"))
        )
    "#;
    for h in [Harness::wasmtime(), Harness::wasmi()] {
        let ctx = h.ctx();
        let code = wat::parse_str(loop_wat).unwrap();
        let (code_id, _) = h
            .kiln
            .create(&ctx, &CREATOR, code, &[], CodeMetadata::default(), false, false)
            .unwrap();
        let (addr, _) = h
            .kiln
            .instantiate(&ctx, code_id, &CREATOR, &[], &vec![], "loop")
            .unwrap();

        // Leave ~1k ledger gas after the instance cost; the fuel bound
        // derived from it kills the loop quickly.
        let exec_ctx = h.ctx_with_gas(61_000);
        let err = h
            .kiln
            .execute(&exec_ctx, &addr, &CREATOR, &[], &vec![], &[], false)
            .unwrap_err();
        assert!(matches!(err, KilnError::OutOfGas { .. }), "{err:?}");
        assert!(exec_ctx.is_out_of_gas());
    }
}

// ─── Determinism across backends ────────────────────────────────────────────

#[test]
fn test_backends_produce_identical_observable_results() {
    let mut outcomes = Vec::new();
    for h in [Harness::wasmtime(), Harness::wasmi()] {
        let ctx = h.ctx_with_gas(5_000_000);
        let (_, addr) = h.store_kv_contract(&ctx);

        let mut msg = vec![1u8];
        msg.extend_from_slice(b"deterministic");
        let data = h
            .kiln
            .execute(&ctx, &addr, &CREATOR, &msg, &vec![], &[], false)
            .unwrap();
        outcomes.push((addr, data, ctx.events(), ctx.gas_consumed()));
    }
    assert_eq!(outcomes[0], outcomes[1]);
}

// ─── Pinning ────────────────────────────────────────────────────────────────

#[test]
fn test_pin_execute_unpin() {
    for h in [Harness::wasmtime(), Harness::wasmi()] {
        let ctx = h.ctx();
        let (code_id, addr) = h.store_kv_contract(&ctx);

        h.kiln.pin_code(&ctx, code_id).unwrap();
        let info = h.kiln.get_code_info(&ctx, code_id).unwrap().unwrap();
        assert!(info.pinned);
        assert!(h.kiln.code_store.has_pinned_artifact(&info.code_hash));

        // Pinned dispatch still behaves identically.
        let mut msg = vec![1u8];
        msg.extend_from_slice(b"pinned");
        let data = h
            .kiln
            .execute(&ctx, &addr, &CREATOR, &msg, &vec![], &[], false)
            .unwrap();
        assert_eq!(data, b"pinned");

        // Unpin flips the flag but leaves the artifact on disk.
        h.kiln.unpin_code(&ctx, code_id).unwrap();
        let info = h.kiln.get_code_info(&ctx, code_id).unwrap().unwrap();
        assert!(!info.pinned);
        assert!(h.kiln.code_store.has_pinned_artifact(&info.code_hash));
    }
}

// ─── Interpreted dialects ───────────────────────────────────────────────────

fn install_interpreters(h: &Harness, ctx: &TxContext) {
    let interp = wat::parse_str(INTERP_WAT).unwrap();
    for (addr, label) in [
        (system::ADDR_INTERPRETER_PY, "interpreter-py"),
        (system::ADDR_INTERPRETER_EVM, "interpreter-evm"),
    ] {
        h.kiln
            .register_system_contract(
                ctx,
                addr,
                interp.clone(),
                &[],
                label,
                Some(system::ROLE_INTERPRETER),
            )
            .unwrap();
    }
}

#[test]
fn test_utf8_source_dispatches_through_interpreter() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    install_interpreters(&h, &ctx);

    let source = b"def handle(msg):\n    return msg\n".to_vec();
    let deps = vec![system::INTERPRETER_PYTHON.to_string()];
    let (code_id, code_hash) = h
        .kiln
        .create(
            &ctx,
            &CREATOR,
            source.clone(),
            &deps,
            CodeMetadata::default(),
            false,
            false,
        )
        .unwrap();
    assert_eq!(code_hash, checksum(&source));
    // The source landed in the per-dialect tree.
    assert!(h.kiln.code_store.source_path(&code_hash, "py").exists());

    let (addr, data) = h
        .kiln
        .instantiate(&ctx, code_id, &CREATOR, &[], &vec![], "py contract")
        .unwrap();
    // The stand-in interpreter echoes the source it was asked to run.
    assert_eq!(data, source);

    let data = h
        .kiln
        .execute(&ctx, &addr, &CREATOR, b"anything", &vec![], &[], false)
        .unwrap();
    assert_eq!(data, source);
}

#[test]
fn test_evm_bytecode_create_captures_runtime() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    install_interpreters(&h, &ctx);

    // Deployment bytecode; the stand-in interpreter's constructor echoes it,
    // so it also becomes the runtime bytecode.
    let deployment = vec![0x60, 0x80, 0x60, 0x40, 0x52];
    let deps = vec![system::INTERPRETER_EVM_SHANGHAI.to_string()];
    let (code_id, code_hash, addr) = h
        .kiln
        .create_interpreted(
            &ctx,
            &CREATOR,
            None,
            deployment.clone(),
            &deps,
            CodeMetadata::default(),
            vec![],
            vec![],
            "evm contract".to_string(),
            &[],
        )
        .unwrap();
    assert_eq!(code_hash, checksum(&deployment));

    let info = h.kiln.get_code_info(&ctx, code_id).unwrap().unwrap();
    assert_eq!(info.interpreted_bytecode_deployment, deployment);
    assert_eq!(info.interpreted_bytecode_runtime, deployment);
    assert_eq!(info.runtime_hash, Some(checksum(&deployment)));

    // Execute runs the runtime bytecode through the interpreter.
    let data = h
        .kiln
        .execute(&ctx, &addr, &CREATOR, b"", &vec![], &[], false)
        .unwrap();
    assert_eq!(data, deployment);
}

#[test]
fn test_create_interpreted_rejects_wasm() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    let code = wat::parse_str(KV_WAT).unwrap();
    let err = h
        .kiln
        .create_interpreted(
            &ctx,
            &CREATOR,
            None,
            code,
            &[system::INTERPRETER_EVM_SHANGHAI.to_string()],
            CodeMetadata::default(),
            vec![],
            vec![],
            "nope".to_string(),
            &[],
        )
        .unwrap_err();
    assert!(matches!(err, KilnError::CreateFailed(_)));
}

// ─── Snapshot extension ─────────────────────────────────────────────────────

#[test]
fn test_snapshot_and_restore_sources() {
    let h = Harness::wasmtime();
    let ctx = h.ctx();
    install_interpreters(&h, &ctx);

    let source = b"print('snapshot me')\n".to_vec();
    let deps = vec![system::INTERPRETER_PYTHON.to_string()];
    let (_, code_hash) = h
        .kiln
        .create(
            &ctx,
            &CREATOR,
            source.clone(),
            &deps,
            CodeMetadata::default(),
            false,
            false,
        )
        .unwrap();
    // A second code id over the same source: still streamed once.
    h.kiln
        .create(&ctx, &CREATOR, source.clone(), &deps, CodeMetadata::default(), false, false)
        .unwrap();

    let mut items = Vec::new();
    h.kiln
        .snapshot_sources(&ctx, &mut |item| {
            items.push(item);
            Ok(())
        })
        .unwrap();
    assert_eq!(items.len(), 1);

    // Restore into a fresh node sharing the metadata state.
    let h2 = Harness::wasmtime();
    let ctx2 = h2.ctx();
    h2.kiln.restore_sources(&ctx2, items).unwrap();
    assert_eq!(
        h2.kiln.code_store.load_source(&code_hash, "py").unwrap(),
        source
    );
}
