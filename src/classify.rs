//! Submission failure classification
//!
//! Turns node errors into a [`Diagnosis`] a user can act on. Custom program
//! errors are decoded with the code table of the program the failing
//! instruction targeted; well-known transaction errors are named directly;
//! anything else falls back to the raw node message. The classifier is pure:
//! it never retries and holds no mutable state.

use std::collections::HashMap;

use serde::Serialize;
use solana_sdk::{instruction::InstructionError, pubkey::Pubkey, transaction::TransactionError};

use crate::rpc_manager::{NodeTransactionError, RpcManagerError};
use crate::tx_builder::SignedTransaction;

/// One decoded custom error code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgramErrorEntry {
    pub code: u32,
    pub name: &'static str,
    /// Short, user-facing
    pub summary: &'static str,
    pub detail: &'static str,
}

/// Fixed code table of one program
#[derive(Debug, Clone)]
pub struct ProgramErrorTable {
    pub program_id: Pubkey,
    pub program_name: &'static str,
    pub entries: &'static [ProgramErrorEntry],
}

impl ProgramErrorTable {
    pub fn lookup(&self, code: u32) -> Option<&ProgramErrorEntry> {
        self.entries.iter().find(|entry| entry.code == code)
    }
}

const SYSTEM_PROGRAM_ERRORS: &[ProgramErrorEntry] = &[
    ProgramErrorEntry {
        code: 0,
        name: "AccountAlreadyInUse",
        summary: "account already in use",
        detail: "an account with the same address already exists",
    },
    ProgramErrorEntry {
        code: 1,
        name: "ResultWithNegativeLamports",
        summary: "insufficient funds",
        detail: "account does not have enough SOL to perform the operation",
    },
    ProgramErrorEntry {
        code: 2,
        name: "InvalidProgramId",
        summary: "invalid program id",
        detail: "cannot assign account to this program id",
    },
    ProgramErrorEntry {
        code: 3,
        name: "InvalidAccountDataLength",
        summary: "invalid account data length",
        detail: "cannot allocate account data of this length",
    },
    ProgramErrorEntry {
        code: 4,
        name: "MaxSeedLengthExceeded",
        summary: "seed too long",
        detail: "length of requested seed is too long",
    },
    ProgramErrorEntry {
        code: 5,
        name: "AddressWithSeedMismatch",
        summary: "address does not match seed",
        detail: "provided address does not match addressed derived from seed",
    },
    ProgramErrorEntry {
        code: 6,
        name: "NonceNoRecentBlockhashes",
        summary: "no recent blockhashes",
        detail: "advancing stored nonce requires a populated RecentBlockhashes sysvar",
    },
    ProgramErrorEntry {
        code: 7,
        name: "NonceBlockhashNotExpired",
        summary: "nonce blockhash not expired",
        detail: "stored nonce is still in recent_blockhashes",
    },
    ProgramErrorEntry {
        code: 8,
        name: "NonceUnexpectedBlockhashValue",
        summary: "unexpected nonce value",
        detail: "specified nonce does not match stored nonce",
    },
];

/// Built-in table of the system program
#[allow(deprecated)]
pub fn system_program_table() -> ProgramErrorTable {
    ProgramErrorTable {
        program_id: solana_sdk::system_program::id(),
        program_name: "system",
        entries: SYSTEM_PROGRAM_ERRORS,
    }
}

/// What kind of cause a diagnosis describes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosisKind {
    /// Custom error code of the program targeted by an instruction
    ProgramError {
        #[serde(serialize_with = "serialize_display")]
        program_id: Pubkey,
        instruction_index: u8,
        code: u32,
    },
    /// Built-in instruction error (not a custom code)
    InstructionError { instruction_index: u8 },
    /// Transaction-level error
    TransactionError,
    /// Undecodable node error; the summary is the node's message
    NodeMessage,
    /// Connection, timeout or rate limit
    Transport,
    /// Passed through unchanged
    Opaque,
}

fn serialize_display<S>(value: &Pubkey, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.collect_str(value)
}

/// Actionable description of a failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnosis {
    pub kind: DiagnosisKind,
    pub summary: String,
    pub detail: Option<String>,
    pub logs: Vec<String>,
}

impl Diagnosis {
    fn new(kind: DiagnosisKind, summary: impl Into<String>) -> Self {
        Self {
            kind,
            summary: summary.into(),
            detail: None,
            logs: Vec::new(),
        }
    }

    fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }
}

impl std::fmt::Display for Diagnosis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {}", self.summary, detail),
            None => f.write_str(&self.summary),
        }
    }
}

/// Compiled instruction index to program id mapping of the failing transaction
#[derive(Debug, Clone, Default)]
pub struct ClassifyContext {
    pub instruction_programs: Vec<Pubkey>,
}

impl ClassifyContext {
    pub fn new(instruction_programs: Vec<Pubkey>) -> Self {
        Self {
            instruction_programs,
        }
    }

    pub fn for_transaction(signed: &SignedTransaction) -> Self {
        Self::new(signed.instruction_programs().to_vec())
    }

    fn program_at(&self, index: u8) -> Option<&Pubkey> {
        self.instruction_programs.get(index as usize)
    }
}

/// Maps node errors to diagnoses
#[derive(Debug, Clone)]
pub struct ErrorClassifier {
    tables: HashMap<Pubkey, ProgramErrorTable>,
}

impl Default for ErrorClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ErrorClassifier {
    /// Classifier with the built-in system program table
    pub fn new() -> Self {
        let mut classifier = Self {
            tables: HashMap::new(),
        };
        classifier.register(system_program_table());
        classifier
    }

    /// Add or replace the table of one program
    pub fn register(&mut self, table: ProgramErrorTable) {
        self.tables.insert(table.program_id, table);
    }

    /// Classify an error returned by the node
    pub fn classify(&self, error: &RpcManagerError, context: &ClassifyContext) -> Diagnosis {
        match error {
            RpcManagerError::PreflightFailure {
                message,
                error: tx_error,
                logs,
                ..
            } => {
                let diagnosis = match tx_error {
                    Some(tx_error) if tx_error.decoded.is_some() => {
                        self.classify_transaction_error(tx_error, context)
                    }
                    _ => Diagnosis::new(DiagnosisKind::NodeMessage, message.clone()),
                };
                diagnosis.with_logs(logs.clone())
            }
            RpcManagerError::AlreadyProcessed { .. } => {
                Diagnosis::new(DiagnosisKind::TransactionError, "already processed")
                    .with_detail("this transaction has already been processed")
            }
            RpcManagerError::BlockhashNotFound { .. } => {
                Diagnosis::new(DiagnosisKind::TransactionError, "blockhash not found")
                    .with_detail("the recent blockhash expired or is unknown to the node")
            }
            RpcManagerError::Transport { .. }
            | RpcManagerError::Timeout { .. }
            | RpcManagerError::RateLimitExceeded { .. } => {
                Diagnosis::new(DiagnosisKind::Transport, error.to_string())
            }
            RpcManagerError::RpcResponse { .. }
            | RpcManagerError::MalformedResponse(_)
            | RpcManagerError::Configuration(_) => {
                Diagnosis::new(DiagnosisKind::Opaque, error.to_string())
            }
        }
    }

    /// Classify an execution error reported by the node
    pub fn classify_transaction_error(
        &self,
        error: &NodeTransactionError,
        context: &ClassifyContext,
    ) -> Diagnosis {
        let decoded = match &error.decoded {
            Some(decoded) => decoded,
            None => return Diagnosis::new(DiagnosisKind::NodeMessage, error.message.clone()),
        };

        match decoded {
            TransactionError::InstructionError(index, InstructionError::Custom(code)) => {
                self.classify_custom(*index, *code, context)
            }
            TransactionError::InstructionError(index, instruction_error) => {
                let kind = DiagnosisKind::InstructionError {
                    instruction_index: *index,
                };
                match instruction_error_summary(instruction_error) {
                    Some(summary) => Diagnosis::new(kind, summary)
                        .with_detail(format!("instruction {}: {}", index, instruction_error)),
                    None => Diagnosis::new(
                        kind,
                        format!("instruction {}: {}", index, instruction_error),
                    ),
                }
            }
            other => match transaction_error_summary(other) {
                Some(summary) => Diagnosis::new(DiagnosisKind::TransactionError, summary)
                    .with_detail(other.to_string()),
                None => Diagnosis::new(DiagnosisKind::TransactionError, other.to_string()),
            },
        }
    }

    fn classify_custom(&self, index: u8, code: u32, context: &ClassifyContext) -> Diagnosis {
        let program_id = match context.program_at(index) {
            Some(program_id) => *program_id,
            None => {
                return Diagnosis::new(
                    DiagnosisKind::InstructionError {
                        instruction_index: index,
                    },
                    format!("custom program error {:#x} in instruction {}", code, index),
                )
            }
        };

        let kind = DiagnosisKind::ProgramError {
            program_id,
            instruction_index: index,
            code,
        };

        match self
            .tables
            .get(&program_id)
            .and_then(|table| table.lookup(code).map(|entry| (table, entry)))
        {
            Some((table, entry)) => Diagnosis::new(kind, entry.summary).with_detail(format!(
                "{} ({} program error {})",
                entry.detail, table.program_name, entry.name
            )),
            None => Diagnosis::new(
                kind,
                format!("custom program error {:#x} from {}", code, program_id),
            ),
        }
    }
}

fn instruction_error_summary(error: &InstructionError) -> Option<&'static str> {
    match error {
        InstructionError::InsufficientFunds => Some("insufficient funds"),
        InstructionError::ComputationalBudgetExceeded => Some("compute budget exceeded"),
        InstructionError::MissingRequiredSignature => Some("missing required signature"),
        InstructionError::AccountAlreadyInitialized => Some("account already initialized"),
        _ => None,
    }
}

fn transaction_error_summary(error: &TransactionError) -> Option<&'static str> {
    match error {
        TransactionError::InsufficientFundsForFee => Some("insufficient funds for fee"),
        TransactionError::InsufficientFundsForRent { .. } => Some("insufficient funds for rent"),
        TransactionError::BlockhashNotFound => Some("blockhash not found"),
        TransactionError::AlreadyProcessed => Some("already processed"),
        TransactionError::AccountNotFound => Some("account not found"),
        TransactionError::AccountInUse => Some("account in use"),
        TransactionError::WouldExceedMaxBlockCostLimit
        | TransactionError::WouldExceedMaxAccountCostLimit => Some("block is full"),
        _ => None,
    }
}
