use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex, RwLock};

use bitcoin::bip32::{DerivationPath, Xpriv};
use bitcoin::secp256k1::Secp256k1;
use bitcoin::Network;
use fp_db::traits::{EotsKeyDatabase, NonceDatabase};
use fp_db::types::{EotsKeyRecord, RandKey};
use fp_eots::{
    generate_randomness, new_sec_rand, pub_rand_to_bytes, sec_rand_to_bytes, sig_to_bytes,
    SecretKey,
};
use fp_primitives::{Buf32, Buf64};
use rand::rngs::OsRng;
use rand::RngCore;
use tracing::{error, info};
use zeroize::Zeroizing;

use crate::error::EotsManagerError;
use crate::keystore::Keystore;

/// Default BIP-32 derivation path for EOTS keys.
pub const DEFAULT_HD_PATH: &str = "m/84'/0'/0'/0/0";

type SharedNonceDb = Arc<dyn NonceDatabase + Send + Sync>;
type SharedKeyDb = Arc<dyn EotsKeyDatabase + Send + Sync>;

/// Key owner and signer.
///
/// `sign_eots` runs derive-consume-sign as one critical section per
/// (pk, chain, height): the nonce consumption is persisted before any
/// signature bytes exist, so two racing requests for the same height can
/// never both obtain signatures over different messages.
pub struct EotsManager {
    keystore: Keystore,
    key_db: SharedKeyDb,
    nonce_db: SharedNonceDb,
    unlocked: RwLock<HashMap<Buf32, Arc<SecretKey>>>,
    sign_locks: Mutex<HashMap<RandKey, Arc<Mutex<()>>>>,
}

impl EotsManager {
    pub fn new(keystore: Keystore, key_db: SharedKeyDb, nonce_db: SharedNonceDb) -> Self {
        Self {
            keystore,
            key_db,
            nonce_db,
            unlocked: RwLock::new(HashMap::new()),
            sign_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Generates a fresh key under `name`, seals its seed with the
    /// passphrase, registers the pubkey, and leaves the key unlocked.
    pub fn create_key(
        &self,
        name: &str,
        passphrase: &str,
        hd_path: &str,
    ) -> Result<Buf32, EotsManagerError> {
        let path = parse_hd_path(hd_path)?;

        let mut seed = Zeroizing::new([0u8; 32]);
        OsRng.fill_bytes(&mut *seed);

        let sk = derive_key(&seed, &path)?;
        let btc_pk = sk.pubkey().to_bytes();

        self.keystore.seal(name, passphrase, &seed)?;
        self.key_db.put_eots_key(
            &btc_pk,
            &EotsKeyRecord {
                name: name.to_string(),
                hd_path: hd_path.to_string(),
            },
        )?;

        self.unlocked
            .write()
            .expect("unlocked map poisoned")
            .insert(btc_pk, Arc::new(sk));

        info!(%name, %btc_pk, "created eots key");
        Ok(btc_pk)
    }

    /// Opens the sealed seed for `btc_pk` and holds the derived key in
    /// memory for the process lifetime.
    pub fn unlock_key(&self, btc_pk: &Buf32, passphrase: &str) -> Result<(), EotsManagerError> {
        let record = self
            .key_db
            .get_eots_key(btc_pk)?
            .ok_or(EotsManagerError::KeyNotFound(*btc_pk))?;

        let seed = self.keystore.open(&record.name, passphrase)?;
        let path = parse_hd_path(&record.hd_path)?;
        let sk = derive_key(&seed, &path)?;
        if sk.pubkey().to_bytes() != *btc_pk {
            return Err(EotsManagerError::KeyMismatch(*btc_pk));
        }

        self.unlocked
            .write()
            .expect("unlocked map poisoned")
            .insert(*btc_pk, Arc::new(sk));
        Ok(())
    }

    fn unlocked_key(&self, btc_pk: &Buf32) -> Result<Arc<SecretKey>, EotsManagerError> {
        self.unlocked
            .read()
            .expect("unlocked map poisoned")
            .get(btc_pk)
            .cloned()
            .ok_or(EotsManagerError::KeyLocked(*btc_pk))
    }

    /// Derives randomness for `num` consecutive heights, persists the
    /// secret halves, and returns the x-only public halves in height order.
    ///
    /// The derivation is a pure function of (key, chain, height); calling
    /// this again for the same range reproduces the identical list.
    pub fn derive_pub_rand_list(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        start_height: u64,
        num: u64,
    ) -> Result<Vec<Buf32>, EotsManagerError> {
        let sk = self.unlocked_key(btc_pk)?;
        let key = Zeroizing::new(sk.to_bytes().into_inner());

        let mut secrets = Vec::with_capacity(num as usize);
        let mut publics = Vec::with_capacity(num as usize);
        for height in start_height..start_height + num {
            let (sec_rand, pub_rand) = generate_randomness(&*key, chain_id.as_bytes(), height);
            secrets.push(sec_rand_to_bytes(&sec_rand));
            publics.push(pub_rand_to_bytes(&pub_rand));
        }

        self.nonce_db
            .insert_nonces(btc_pk, chain_id, start_height, &secrets)?;
        Ok(publics)
    }

    /// Re-derives the public randomness for one height.
    pub fn get_pub_rand(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        height: u64,
    ) -> Result<Buf32, EotsManagerError> {
        let sk = self.unlocked_key(btc_pk)?;
        let key = Zeroizing::new(sk.to_bytes().into_inner());
        let (_, pub_rand) = generate_randomness(&*key, chain_id.as_bytes(), height);
        Ok(pub_rand_to_bytes(&pub_rand))
    }

    /// Produces the EOTS signature for one height.
    ///
    /// The nonce is marked consumed *before* the signature is computed. A
    /// consume refusal surfaces as [`EotsManagerError::Equivocation`] and no
    /// signature bytes are produced.
    pub fn sign_eots(
        &self,
        btc_pk: &Buf32,
        chain_id: &str,
        height: u64,
        msg_digest: &Buf32,
    ) -> Result<Buf32, EotsManagerError> {
        let sk = self.unlocked_key(btc_pk)?;
        let rand_key = RandKey::new(*btc_pk, chain_id, height);

        let lock = self.sign_lock(&rand_key);
        let result = {
            let _guard = lock.lock().expect("sign lock poisoned");

            let entry = self
                .nonce_db
                .get_nonce(&rand_key)?
                .ok_or(EotsManagerError::NonceMissing(height))?;

            match self.nonce_db.mark_consumed(&rand_key, msg_digest) {
                Ok(()) => {
                    let sec_rand = new_sec_rand(&entry.sec_rand)?;
                    Ok(sig_to_bytes(&sk.sign(&sec_rand, msg_digest)))
                }
                Err(err) => {
                    let err = EotsManagerError::from(err);
                    if matches!(err, EotsManagerError::Equivocation(_)) {
                        error!(%btc_pk, %chain_id, %height, "refusing to double-sign");
                    }
                    Err(err)
                }
            }
        };
        drop(lock);
        self.release_sign_lock(&rand_key);
        result
    }

    /// Plain BIP-340 signature over an arbitrary-length message, used for
    /// the randomness commitment itself.
    pub fn sign_schnorr(&self, btc_pk: &Buf32, msg: &[u8]) -> Result<Buf64, EotsManagerError> {
        let sk = self.unlocked_key(btc_pk)?;
        let signing_key = k256::schnorr::SigningKey::from_bytes(sk.to_bytes().as_bytes())
            .map_err(|_| EotsManagerError::Crypto(fp_eots::EotsError::SecretKeyParseFailed))?;
        let mut aux_rand = [0u8; 32];
        OsRng.fill_bytes(&mut aux_rand);
        let sig = signing_key
            .sign_raw(msg, &aux_rand)
            .map_err(|_| EotsManagerError::Crypto(fp_eots::EotsError::ScalarParseFailed))?;
        Ok(Buf64::from(sig.to_bytes()))
    }

    fn sign_lock(&self, key: &RandKey) -> Arc<Mutex<()>> {
        let mut table = self.sign_locks.lock().expect("sign lock table poisoned");
        table.entry(key.clone()).or_default().clone()
    }

    fn release_sign_lock(&self, key: &RandKey) {
        let mut table = self.sign_locks.lock().expect("sign lock table poisoned");
        if let Some(lock) = table.get(key) {
            if Arc::strong_count(lock) == 1 {
                table.remove(key);
            }
        }
    }
}

fn parse_hd_path(hd_path: &str) -> Result<DerivationPath, EotsManagerError> {
    DerivationPath::from_str(hd_path)
        .map_err(|_| EotsManagerError::InvalidHdPath(hd_path.to_string()))
}

fn derive_key(seed: &[u8; 32], path: &DerivationPath) -> Result<SecretKey, EotsManagerError> {
    let secp = Secp256k1::new();
    let master = Xpriv::new_master(Network::Bitcoin, seed)
        .expect("bip32: 32-byte seed is always valid");
    let child = master
        .derive_priv(&secp, path)
        .expect("bip32: derivation cannot fail for valid path");
    Ok(SecretKey::from_bytes(&Buf32::from(
        child.private_key.secret_bytes(),
    ))?)
}

#[cfg(test)]
mod tests {
    use fp_eots::{new_pub_rand, new_sig, PublicKey};
    use fp_rocksdb_store::test_utils::get_rocksdb_tmp_instance;
    use fp_rocksdb_store::{EotsKeyDb, NonceDb};
    use k256::ecdsa::signature::Verifier;
    use k256::schnorr::{Signature, VerifyingKey};

    use super::*;

    const PASSPHRASE: &str = "correct horse battery staple";
    const CHAIN_ID: &str = "test-chain";

    fn tmp_keystore_dir() -> std::path::PathBuf {
        tempfile::Builder::new()
            .prefix("fpd-eots-test")
            .tempdir()
            .unwrap()
            .into_path()
    }

    fn manager_at(
        db: Arc<rocksdb::DB>,
        keystore_dir: &std::path::Path,
    ) -> EotsManager {
        EotsManager::new(
            Keystore::new(keystore_dir).unwrap(),
            Arc::new(EotsKeyDb::new(db.clone())),
            Arc::new(NonceDb::new(db)),
        )
    }

    #[test]
    fn test_create_derive_sign_verify() {
        let db = get_rocksdb_tmp_instance();
        let em = manager_at(db, &tmp_keystore_dir());
        let pk = em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH).unwrap();

        let publics = em.derive_pub_rand_list(&pk, CHAIN_ID, 100, 5).unwrap();
        assert_eq!(publics.len(), 5);

        let digest = Buf32::from([0x77; 32]);
        let sig = em.sign_eots(&pk, CHAIN_ID, 102, &digest).unwrap();

        let verifier = PublicKey::from_bytes(&pk).unwrap();
        let pub_rand = new_pub_rand(&publics[2]).unwrap();
        assert!(verifier
            .verify(&pub_rand, &digest, &new_sig(&sig).unwrap())
            .unwrap());
    }

    #[test]
    fn test_second_digest_is_equivocation() {
        let db = get_rocksdb_tmp_instance();
        let em = manager_at(db, &tmp_keystore_dir());
        let pk = em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH).unwrap();
        em.derive_pub_rand_list(&pk, CHAIN_ID, 1200, 10).unwrap();

        let digest = Buf32::from([0xaa; 32]);
        let sig1 = em.sign_eots(&pk, CHAIN_ID, 1205, &digest).unwrap();

        // Same digest: idempotent, same signature comes back.
        let sig2 = em.sign_eots(&pk, CHAIN_ID, 1205, &digest).unwrap();
        assert_eq!(sig1, sig2);

        // Different digest at the same height: refused, no signature.
        let res = em.sign_eots(&pk, CHAIN_ID, 1205, &Buf32::from([0xbb; 32]));
        assert!(matches!(res, Err(EotsManagerError::Equivocation(1205))));
    }

    #[test]
    fn test_sign_without_derived_nonce() {
        let db = get_rocksdb_tmp_instance();
        let em = manager_at(db, &tmp_keystore_dir());
        let pk = em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH).unwrap();

        let res = em.sign_eots(&pk, CHAIN_ID, 42, &Buf32::from([1; 32]));
        assert!(matches!(res, Err(EotsManagerError::NonceMissing(42))));
    }

    #[test]
    fn test_rederivation_after_restart() {
        let db = get_rocksdb_tmp_instance();
        let keystore_dir = tmp_keystore_dir();

        let em = manager_at(db.clone(), &keystore_dir);
        let pk = em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH).unwrap();
        let before = em.derive_pub_rand_list(&pk, CHAIN_ID, 500, 8).unwrap();
        drop(em);

        // Fresh manager over the same keystore and db, as after a restart.
        let em = manager_at(db, &keystore_dir);
        assert!(matches!(
            em.derive_pub_rand_list(&pk, CHAIN_ID, 500, 8),
            Err(EotsManagerError::KeyLocked(_))
        ));
        em.unlock_key(&pk, PASSPHRASE).unwrap();
        let after = em.derive_pub_rand_list(&pk, CHAIN_ID, 500, 8).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_unlock_wrong_passphrase() {
        let db = get_rocksdb_tmp_instance();
        let keystore_dir = tmp_keystore_dir();
        let em = manager_at(db.clone(), &keystore_dir);
        let pk = em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH).unwrap();

        let em = manager_at(db, &keystore_dir);
        assert!(matches!(
            em.unlock_key(&pk, "nope"),
            Err(EotsManagerError::BadPassphrase)
        ));
    }

    #[test]
    fn test_duplicate_key_name() {
        let db = get_rocksdb_tmp_instance();
        let keystore_dir = tmp_keystore_dir();
        let em = manager_at(db, &keystore_dir);
        em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH).unwrap();
        assert!(matches!(
            em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH),
            Err(EotsManagerError::KeyNameExists(_))
        ));
    }

    #[test]
    fn test_schnorr_commit_signature_verifies() {
        let db = get_rocksdb_tmp_instance();
        let em = manager_at(db, &tmp_keystore_dir());
        let pk = em.create_key("default", PASSPHRASE, DEFAULT_HD_PATH).unwrap();

        let msg = fp_primitives::hash::commit_message(1200, 1000, &Buf32::from([6; 32]));
        let sig = em.sign_schnorr(&pk, &msg).unwrap();

        let vk = VerifyingKey::from_bytes(pk.as_bytes()).unwrap();
        let sig = Signature::try_from(sig.as_bytes()).unwrap();
        vk.verify(&msg, &sig).unwrap();
    }
}
