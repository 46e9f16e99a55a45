//! 🔭 Object Lister — finds the next thing worth reading, and nothing it already read.
//!
//! Every call re-lists from the store (objects that landed after startup get noticed),
//! starting strictly after the resume key (objects that got archived away can never
//! drag us backwards). Directory markers and names that miss the glob are skipped.
//!
//! 🧠 Knowledge graph:
//! - Only direct children of the folder are listed. `NorthAmerica/USA/file7.log` is not
//!   part of a root listing; it belongs to `NorthAmerica/USA`. An archive folder nested
//!   under the source therefore never feeds archived objects back in.
//! - Glob matches the base name (after the last delimiter). `*.log` matches `file7.log`.
//! - Paging uses `start_after` = last key seen, so a 10k-key prefix costs ceil(10k / page) calls
//!   only when everything in it is ineligible.
//! - `lookup` probes one exact key, for mid-object resumption.

use glob::Pattern;
use tracing::trace;

use crate::error::{SpoolError, StoreOperation};
use crate::location::{Location, ObjectHandle};
use crate::stores::ObjectStore;

/// 📄 Default listing page size. Also S3's maximum.
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// 🔭 Lazily enumerates eligible objects under one [`Location`].
#[derive(Debug, Clone)]
pub struct ObjectLister {
    location: Location,
    prefix: String,
    pattern: Option<Pattern>,
    page_size: usize,
}

impl ObjectLister {
    /// 🚀 Compile the glob up front. An invalid pattern is a configuration problem.
    pub fn new(location: Location, page_size: usize) -> Result<Self, glob::PatternError> {
        let pattern = location
            .pattern
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(Pattern::new)
            .transpose()?;
        Ok(Self {
            prefix: location.prefix(),
            location,
            pattern,
            page_size: page_size.max(1),
        })
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    /// 🎯 Would this handle be emitted (ignoring ordering)?
    pub fn is_eligible(&self, object: &ObjectHandle) -> bool {
        if !object.key.starts_with(&self.prefix) {
            return false;
        }
        if self.location.is_directory_marker(&object.key, object.size) {
            return false;
        }
        if !self.location.delimiter.is_empty()
            && object.key[self.prefix.len()..].contains(self.location.delimiter.as_str())
        {
            return false;
        }
        match &self.pattern {
            Some(the_pattern) => the_pattern.matches(self.location.base_name(&object.key)),
            None => true,
        }
    }

    /// 🔭 First eligible object with a key strictly greater than `resume_after`.
    ///
    /// `Ok(None)` means "nothing new yet". Not an error. Come back later.
    pub async fn next_after<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        resume_after: Option<&str>,
    ) -> Result<Option<ObjectHandle>, SpoolError> {
        let mut the_start_after = resume_after.map(str::to_string);

        loop {
            let the_page = store
                .list(
                    &self.location.bucket,
                    &self.prefix,
                    Some(&self.location.delimiter),
                    the_start_after.as_deref(),
                    self.page_size,
                )
                .await
                .map_err(|e| {
                    SpoolError::store(StoreOperation::List, &self.location.bucket, &self.prefix, e)
                })?;

            for the_object in &the_page.objects {
                // -- 🛡️ stores are supposed to honour start_after. trust, but verify.
                if let Some(the_floor) = resume_after
                    && the_object.key.as_str() <= the_floor
                {
                    continue;
                }
                if self.is_eligible(the_object) {
                    trace!("🔭 next eligible object is '{}'", the_object.key);
                    return Ok(Some(the_object.clone()));
                }
                trace!("🔭 skipping ineligible key '{}'", the_object.key);
            }

            match (the_page.truncated, the_page.objects.last()) {
                (true, Some(the_last)) => the_start_after = Some(the_last.key.clone()),
                _ => return Ok(None),
            }
        }
    }

    /// 🔍 Find exactly `key`, if it still exists and is still eligible.
    pub async fn lookup<S: ObjectStore + ?Sized>(
        &self,
        store: &S,
        key: &str,
    ) -> Result<Option<ObjectHandle>, SpoolError> {
        let the_page = store
            .list(&self.location.bucket, key, None, None, 1)
            .await
            .map_err(|e| SpoolError::store(StoreOperation::List, &self.location.bucket, key, e))?;
        Ok(the_page
            .objects
            .into_iter()
            .find(|o| o.key == key)
            .filter(|o| self.is_eligible(o)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::InMemoryObjectStore;

    async fn the_north_american_bucket() -> InMemoryObjectStore {
        let the_store = InMemoryObjectStore::new();
        for the_key in [
            "file1.log",
            "file2.log",
            "file3.log",
            "notes.txt",
            "NorthAmerica/",
            "NorthAmerica/file4.log",
            "NorthAmerica/USA/",
            "NorthAmerica/USA/file7.log",
            "NorthAmerica/USA/file8.log",
            "NorthAmerica/USA/file9.log",
        ] {
            let the_body = if the_key.ends_with('/') { "" } else { "Hello World" };
            the_store.put("mybucket", the_key, the_body).await;
        }
        the_store
    }

    async fn drain(lister: &ObjectLister, store: &InMemoryObjectStore) -> Vec<String> {
        let mut the_keys = Vec::new();
        let mut the_last: Option<String> = None;
        while let Some(the_object) = lister.next_after(store, the_last.as_deref()).await.unwrap() {
            the_last = Some(the_object.key.clone());
            the_keys.push(the_object.key);
        }
        the_keys
    }

    #[tokio::test]
    async fn the_one_where_the_folder_and_glob_narrow_things_down() {
        let the_store = the_north_american_bucket().await;
        let the_lister = ObjectLister::new(
            Location::new("mybucket", "NorthAmerica/USA").with_pattern("*.log"),
            2,
        )
        .unwrap();
        assert_eq!(
            drain(&the_lister, &the_store).await,
            vec![
                "NorthAmerica/USA/file7.log",
                "NorthAmerica/USA/file8.log",
                "NorthAmerica/USA/file9.log"
            ]
        );
    }

    #[tokio::test]
    async fn the_one_where_the_root_lists_only_its_own_files() {
        let the_store = the_north_american_bucket().await;
        let the_lister =
            ObjectLister::new(Location::new("mybucket", "").with_pattern("*.log"), 1).unwrap();
        assert_eq!(
            drain(&the_lister, &the_store).await,
            vec!["file1.log", "file2.log", "file3.log"]
        );
    }

    #[tokio::test]
    async fn the_one_where_directory_markers_and_sub_folders_sit_this_one_out() {
        let the_store = the_north_american_bucket().await;
        let the_lister = ObjectLister::new(Location::new("mybucket", "NorthAmerica"), 10).unwrap();
        assert_eq!(
            drain(&the_lister, &the_store).await,
            vec!["NorthAmerica/file4.log"]
        );
    }

    #[tokio::test]
    async fn the_one_where_lookup_refuses_keys_from_a_sub_folder() {
        let the_store = the_north_american_bucket().await;
        let the_lister =
            ObjectLister::new(Location::new("mybucket", "NorthAmerica").with_pattern("*.log"), 10)
                .unwrap();
        assert!(the_lister.lookup(&the_store, "NorthAmerica/file4.log").await.unwrap().is_some());
        assert!(
            the_lister
                .lookup(&the_store, "NorthAmerica/USA/file7.log")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn the_one_where_resume_after_is_a_hard_floor() {
        let the_store = the_north_american_bucket().await;
        let the_lister =
            ObjectLister::new(Location::new("mybucket", "").with_pattern("file*.log"), 10).unwrap();
        let the_next = the_lister
            .next_after(&the_store, Some("file2.log"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(the_next.key, "file3.log");
        assert!(
            the_lister
                .next_after(&the_store, Some("file3.log"))
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn the_one_where_late_arrivals_are_noticed_on_the_next_call() {
        let the_store = the_north_american_bucket().await;
        let the_lister =
            ObjectLister::new(Location::new("mybucket", "").with_pattern("file*.log"), 10).unwrap();
        assert!(the_lister.next_after(&the_store, Some("file3.log")).await.unwrap().is_none());
        the_store.put("mybucket", "file4.log", "late").await;
        let the_late = the_lister.next_after(&the_store, Some("file3.log")).await.unwrap();
        assert_eq!(the_late.map(|o| o.key), Some("file4.log".to_string()));
    }

    #[tokio::test]
    async fn the_one_where_lookup_finds_exact_keys_only() {
        let the_store = the_north_american_bucket().await;
        the_store.put("mybucket", "file1.log.bak", "x").await;
        let the_lister =
            ObjectLister::new(Location::new("mybucket", "").with_pattern("*.log"), 10).unwrap();
        assert!(the_lister.lookup(&the_store, "file1.log").await.unwrap().is_some());
        assert!(the_lister.lookup(&the_store, "file1.lo").await.unwrap().is_none());
        assert!(the_lister.lookup(&the_store, "notes.txt").await.unwrap().is_none());
    }

    #[test]
    fn the_one_where_bad_globs_are_refused() {
        assert!(ObjectLister::new(Location::new("b", "").with_pattern("[*.log"), 10).is_err());
    }
}
