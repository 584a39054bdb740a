// The UTXO transaction model: inputs consume previous outputs, outputs lock
// value to a public-key hash. Spending an output spends it whole; the
// remainder comes back as a change output.

use crate::error::{BlockchainError, Result};
use crate::storage::UTXOSet;
use crate::utils::{
    base58_decode, deserialize, ecdsa_p256_sha256_sign_digest, ecdsa_p256_sha256_sign_verify,
    random_bytes, serialize, sha256_digest,
};
use crate::wallet::{validate_address, Wallet, ADDRESS_CHECK_SUM_LEN};
use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Reward paid by a coinbase transaction.
pub const SUBSIDY: u64 = 10;

/// Output index reserved for coinbase inputs.
const COINBASE_VOUT: i64 = -1;

/// Entropy width for the data field of an auto-generated coinbase.
const COINBASE_DATA_LEN: usize = 20;

/// A reference to an output of a previous transaction, plus the material
/// proving the right to spend it. For a coinbase input `txid` is empty,
/// `vout` is -1 and `pub_key` carries free-form data.
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXInput {
    txid: Vec<u8>,
    vout: i64,
    signature: Vec<u8>,
    pub_key: Vec<u8>,
}

impl TXInput {
    pub fn new(txid: &[u8], vout: i64) -> TXInput {
        TXInput {
            txid: txid.to_vec(),
            vout,
            signature: vec![],
            pub_key: vec![],
        }
    }

    pub fn get_txid(&self) -> &[u8] {
        self.txid.as_slice()
    }

    pub fn get_vout(&self) -> i64 {
        self.vout
    }

    pub fn get_pub_key(&self) -> &[u8] {
        self.pub_key.as_slice()
    }

    /// Output index as a usable position. Coinbase inputs have none.
    pub fn out_index(&self) -> Result<usize> {
        usize::try_from(self.vout).map_err(|_| {
            BlockchainError::InvalidTransaction(format!("Invalid output index: {}", self.vout))
        })
    }
}

/// An amount locked to the hash of a public key.
#[derive(Debug, Clone, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutput {
    value: u64,
    pub_key_hash: Vec<u8>,
}

impl TXOutput {
    pub fn new(value: u64, address: &str) -> Result<TXOutput> {
        if value == 0 {
            return Err(BlockchainError::InvalidTransaction(
                "Output value must be positive".to_string(),
            ));
        }

        let mut output = TXOutput {
            value,
            pub_key_hash: vec![],
        };
        output.lock(address)?;
        Ok(output)
    }

    pub fn get_value(&self) -> u64 {
        self.value
    }

    pub fn get_pub_key_hash(&self) -> &[u8] {
        self.pub_key_hash.as_slice()
    }

    fn lock(&mut self, address: &str) -> Result<()> {
        if !validate_address(address) {
            return Err(BlockchainError::InvalidAddress(address.to_string()));
        }

        let payload = base58_decode(address)?;
        let pub_key_hash = payload[1..payload.len() - ADDRESS_CHECK_SUM_LEN].to_vec();
        self.pub_key_hash = pub_key_hash;
        Ok(())
    }

    pub fn is_locked_with_key(&self, pub_key_hash: &[u8]) -> bool {
        self.pub_key_hash.eq(pub_key_hash)
    }
}

/// The still-unspent outputs of one transaction, as stored in the
/// chainstate bucket.
#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct TXOutputs {
    pub outputs: Vec<TXOutput>,
}

impl TXOutputs {
    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<TXOutputs> {
        deserialize(bytes)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, bincode::Encode, bincode::Decode)]
pub struct Transaction {
    id: Vec<u8>,
    vin: Vec<TXInput>,
    vout: Vec<TXOutput>,
}

impl Transaction {
    /// Creates the transaction that mints the block reward. With empty
    /// `data` the pub_key field is filled with fresh entropy so repeated
    /// coinbases never collide on id.
    pub fn new_coinbase_tx(to: &str, data: &str) -> Result<Transaction> {
        let data_bytes = if data.is_empty() {
            HEXLOWER
                .encode(random_bytes(COINBASE_DATA_LEN)?.as_slice())
                .into_bytes()
        } else {
            data.as_bytes().to_vec()
        };

        let tx_input = TXInput {
            txid: vec![],
            vout: COINBASE_VOUT,
            signature: vec![],
            pub_key: data_bytes,
        };
        let tx_output = TXOutput::new(SUBSIDY, to)?;

        let mut tx = Transaction {
            id: vec![],
            vin: vec![tx_input],
            vout: vec![tx_output],
        };
        tx.id = tx.hash()?;
        Ok(tx)
    }

    /// Builds and signs a spend of `amount` from the wallet's outputs to
    /// `to`, returning change to the sender.
    pub fn new_utxo_transaction(
        wallet: &Wallet,
        to: &str,
        amount: u64,
        utxo_set: &UTXOSet,
    ) -> Result<Transaction> {
        if amount == 0 {
            return Err(BlockchainError::InvalidTransaction(
                "Amount must be positive".to_string(),
            ));
        }
        if !validate_address(to) {
            return Err(BlockchainError::InvalidAddress(to.to_string()));
        }

        let from = wallet.get_address();
        let pub_key_hash = crate::wallet::hash_pub_key(wallet.get_public_key());

        let (accumulated, valid_outputs) =
            utxo_set.find_spendable_outputs(pub_key_hash.as_slice(), amount)?;
        if accumulated < amount {
            return Err(BlockchainError::NotEnoughFunds {
                required: amount,
                available: accumulated,
            });
        }

        let mut inputs = vec![];
        for (txid_hex, outs) in valid_outputs {
            let txid = HEXLOWER.decode(txid_hex.as_bytes()).map_err(|e| {
                BlockchainError::InvalidTransaction(format!("Invalid transaction id: {e}"))
            })?;
            for out in outs {
                inputs.push(TXInput {
                    txid: txid.clone(),
                    vout: out as i64,
                    signature: vec![],
                    pub_key: wallet.get_public_key().to_vec(),
                });
            }
        }

        let mut outputs = vec![TXOutput::new(amount, to)?];
        if accumulated > amount {
            outputs.push(TXOutput::new(accumulated - amount, &from)?);
        }

        let mut tx = Transaction {
            id: vec![],
            vin: inputs,
            vout: outputs,
        };
        tx.id = tx.hash()?;

        utxo_set
            .get_blockchain()
            .sign_transaction(&mut tx, wallet.get_pkcs8())?;
        Ok(tx)
    }

    /// A copy with every input stripped of signature and public key; the
    /// deterministic base of the signing digest.
    fn trimmed_copy(&self) -> Transaction {
        let inputs = self
            .vin
            .iter()
            .map(|input| TXInput::new(input.get_txid(), input.get_vout()))
            .collect();

        Transaction {
            id: self.id.clone(),
            vin: inputs,
            vout: self.vout.clone(),
        }
    }

    /// Signs every input against the transactions its inputs reference,
    /// keyed by hex txid.
    pub fn sign(&mut self, pkcs8: &[u8], prev_txs: &HashMap<String, Transaction>) -> Result<()> {
        if self.is_coinbase() {
            return Ok(());
        }

        let mut tx_copy = self.trimmed_copy();

        for idx in 0..self.vin.len() {
            let vin = &self.vin[idx];
            let prev_tx = prev_txs
                .get(&HEXLOWER.encode(vin.get_txid()))
                .ok_or(BlockchainError::TransactionNotFound)?;
            let out_idx = vin.out_index()?;
            if out_idx >= prev_tx.vout.len() {
                return Err(BlockchainError::InvalidTransaction(
                    "Referenced output does not exist".to_string(),
                ));
            }

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[out_idx].pub_key_hash.clone();
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            let signature = ecdsa_p256_sha256_sign_digest(pkcs8, tx_copy.get_id())?;
            self.vin[idx].signature = signature;
        }
        Ok(())
    }

    /// Checks every input signature against the same digest the signer
    /// produced. A coinbase verifies trivially.
    pub fn verify(&self, prev_txs: &HashMap<String, Transaction>) -> Result<bool> {
        if self.is_coinbase() {
            return Ok(true);
        }

        let mut tx_copy = self.trimmed_copy();

        for (idx, vin) in self.vin.iter().enumerate() {
            let prev_tx = prev_txs
                .get(&HEXLOWER.encode(vin.get_txid()))
                .ok_or(BlockchainError::TransactionNotFound)?;
            let out_idx = vin.out_index()?;
            if out_idx >= prev_tx.vout.len() {
                return Err(BlockchainError::InvalidTransaction(
                    "Referenced output does not exist".to_string(),
                ));
            }

            tx_copy.vin[idx].signature = vec![];
            tx_copy.vin[idx].pub_key = prev_tx.vout[out_idx].pub_key_hash.clone();
            tx_copy.id = tx_copy.hash()?;
            tx_copy.vin[idx].pub_key = vec![];

            if !ecdsa_p256_sha256_sign_verify(
                vin.pub_key.as_slice(),
                vin.signature.as_slice(),
                tx_copy.get_id(),
            ) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// A transaction is coinbase iff its single input references nothing.
    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].txid.is_empty() && self.vin[0].vout == COINBASE_VOUT
    }

    /// SHA-256 of the canonical encoding with the id cleared.
    pub fn hash(&self) -> Result<Vec<u8>> {
        let tx_copy = Transaction {
            id: vec![],
            vin: self.vin.clone(),
            vout: self.vout.clone(),
        };
        Ok(sha256_digest(tx_copy.serialize()?.as_slice()))
    }

    pub fn get_id(&self) -> &[u8] {
        self.id.as_slice()
    }

    pub fn get_id_bytes(&self) -> Vec<u8> {
        self.id.clone()
    }

    pub fn get_vin(&self) -> &[TXInput] {
        self.vin.as_slice()
    }

    pub fn get_vout(&self) -> &[TXOutput] {
        self.vout.as_slice()
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        serialize(self)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Transaction> {
        deserialize(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wallet::hash_pub_key;

    fn prev_map(txs: &[&Transaction]) -> HashMap<String, Transaction> {
        txs.iter()
            .map(|tx| (HEXLOWER.encode(tx.get_id()), (*tx).clone()))
            .collect()
    }

    /// An unsigned spend of the first output of `prev` by `owner`.
    fn spend_of(prev: &Transaction, owner: &Wallet, to: &Wallet, amount: u64) -> Transaction {
        let input = TXInput {
            txid: prev.get_id_bytes(),
            vout: 0,
            signature: vec![],
            pub_key: owner.get_public_key().to_vec(),
        };
        let output = TXOutput::new(amount, &to.get_address()).unwrap();
        let mut tx = Transaction {
            id: vec![],
            vin: vec![input],
            vout: vec![output],
        };
        tx.id = tx.hash().unwrap();
        tx
    }

    #[test]
    fn test_coinbase_shape() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address(), "").unwrap();

        assert!(tx.is_coinbase());
        assert_eq!(tx.get_vin().len(), 1);
        assert_eq!(tx.get_vin()[0].get_vout(), -1);
        assert!(tx.get_vin()[0].get_txid().is_empty());
        assert_eq!(tx.get_vout()[0].get_value(), SUBSIDY);
    }

    #[test]
    fn test_coinbases_do_not_collide() {
        let wallet = Wallet::new().unwrap();
        let a = Transaction::new_coinbase_tx(&wallet.get_address(), "").unwrap();
        let b = Transaction::new_coinbase_tx(&wallet.get_address(), "").unwrap();
        assert_ne!(a.get_id(), b.get_id());
    }

    #[test]
    fn test_coinbase_verifies_trivially() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address(), "").unwrap();
        assert!(tx.verify(&HashMap::new()).unwrap());
    }

    #[test]
    fn test_hash_matches_recomputation() {
        let wallet = Wallet::new().unwrap();
        let tx = Transaction::new_coinbase_tx(&wallet.get_address(), "tag").unwrap();
        assert_eq!(tx.get_id(), tx.hash().unwrap().as_slice());

        let decoded = Transaction::deserialize(&tx.serialize().unwrap()).unwrap();
        assert_eq!(decoded.get_id(), decoded.hash().unwrap().as_slice());
    }

    #[test]
    fn test_sign_then_verify() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();

        let prev = Transaction::new_coinbase_tx(&alice.get_address(), "funding").unwrap();
        let mut tx = spend_of(&prev, &alice, &bob, SUBSIDY);

        let prev_txs = prev_map(&[&prev]);
        tx.sign(alice.get_pkcs8(), &prev_txs).unwrap();

        assert!(tx.verify(&prev_txs).unwrap());
        assert_eq!(tx.get_vin()[0].signature.len(), 64);
    }

    #[test]
    fn test_verify_rejects_wrong_signer() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let mallory = Wallet::new().unwrap();

        let prev = Transaction::new_coinbase_tx(&alice.get_address(), "funding").unwrap();
        let mut tx = spend_of(&prev, &alice, &bob, SUBSIDY);

        let prev_txs = prev_map(&[&prev]);
        tx.sign(mallory.get_pkcs8(), &prev_txs).unwrap();

        // The input still claims alice's public key, so mallory's
        // signature cannot check out.
        assert!(!tx.verify(&prev_txs).unwrap());
    }

    #[test]
    fn test_verify_rejects_tampered_output() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();

        let prev = Transaction::new_coinbase_tx(&alice.get_address(), "funding").unwrap();
        let mut tx = spend_of(&prev, &alice, &bob, SUBSIDY);

        let prev_txs = prev_map(&[&prev]);
        tx.sign(alice.get_pkcs8(), &prev_txs).unwrap();

        tx.vout[0].value += 1;
        assert!(!tx.verify(&prev_txs).unwrap());
    }

    #[test]
    fn test_verify_rejects_tampered_recipient() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let mallory = Wallet::new().unwrap();

        let prev = Transaction::new_coinbase_tx(&alice.get_address(), "funding").unwrap();
        let mut tx = spend_of(&prev, &alice, &bob, SUBSIDY);

        let prev_txs = prev_map(&[&prev]);
        tx.sign(alice.get_pkcs8(), &prev_txs).unwrap();

        tx.vout[0].pub_key_hash = hash_pub_key(mallory.get_public_key());
        assert!(!tx.verify(&prev_txs).unwrap());
    }

    #[test]
    fn test_verify_errors_on_missing_prev_tx() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();

        let prev = Transaction::new_coinbase_tx(&alice.get_address(), "funding").unwrap();
        let mut tx = spend_of(&prev, &alice, &bob, SUBSIDY);
        tx.sign(alice.get_pkcs8(), &prev_map(&[&prev])).unwrap();

        assert!(tx.verify(&HashMap::new()).is_err());
    }

    #[test]
    fn test_trimmed_copy_strips_proofs() {
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();

        let prev = Transaction::new_coinbase_tx(&alice.get_address(), "funding").unwrap();
        let mut tx = spend_of(&prev, &alice, &bob, SUBSIDY);
        tx.sign(alice.get_pkcs8(), &prev_map(&[&prev])).unwrap();

        let trimmed = tx.trimmed_copy();
        assert!(trimmed.vin[0].signature.is_empty());
        assert!(trimmed.vin[0].pub_key.is_empty());
        assert_eq!(trimmed.vout.len(), tx.vout.len());
    }

    #[test]
    fn test_mining_rejects_badly_signed_spend() {
        use crate::core::Blockchain;
        use tempfile::tempdir;

        let temp_dir = tempdir().unwrap();
        let alice = Wallet::new().unwrap();
        let bob = Wallet::new().unwrap();
        let mallory = Wallet::new().unwrap();

        let blockchain = Blockchain::create_blockchain_with_path(
            &alice.get_address(),
            temp_dir.path().join("chain"),
        )
        .unwrap();

        let genesis = blockchain.iterator().last().unwrap();
        let genesis_coinbase = genesis.get_transactions()[0].clone();

        let mut tx = spend_of(&genesis_coinbase, &alice, &bob, SUBSIDY);
        tx.sign(mallory.get_pkcs8(), &prev_map(&[&genesis_coinbase]))
            .unwrap();

        match blockchain.mine_block(&[tx]) {
            Err(BlockchainError::InvalidTransaction(_)) => {}
            other => panic!("Expected InvalidTransaction, got {other:?}"),
        }
        assert_eq!(blockchain.get_best_height().unwrap(), 0);
    }

    #[test]
    fn test_outputs_container_roundtrip() {
        let wallet = Wallet::new().unwrap();
        let outs = TXOutputs {
            outputs: vec![
                TXOutput::new(3, &wallet.get_address()).unwrap(),
                TXOutput::new(7, &wallet.get_address()).unwrap(),
            ],
        };
        let decoded = TXOutputs::deserialize(&outs.serialize().unwrap()).unwrap();
        assert_eq!(decoded.outputs.len(), 2);
        assert_eq!(decoded.outputs[1].get_value(), 7);
    }

    #[test]
    fn test_zero_value_output_is_rejected() {
        let wallet = Wallet::new().unwrap();
        assert!(TXOutput::new(0, &wallet.get_address()).is_err());
    }
}
