// ==========================================
// 表格导入框架 - 树形导入流水线
// ==========================================
// 职责: 预处理 → 建树 → 逐层导入（根 → 叶）→ 收尾 → 落库正确性校验
// 约束:
// - 第 r 层全部节点完成后才开始第 r+1 层
// - 同层节点可选并发导入（有界）
// - 任一节点失败即中止，错误携带该节点聚合的全部行号
// ==========================================

use crate::checker::CorrectnessChecker;
use crate::config::TreeControl;
use crate::domain::mapping::{ColumnMapping, ColumnMappingResolver, DeclaredColumnResolver};
use crate::domain::record::Record;
use crate::domain::row::{CellMatrix, SourceRow};
use crate::domain::tree::{NodeId, Tree, TreeNode, ROOT};
use crate::importer::error::{ImportError, ImportResult};
use crate::importer::format_checker;
use crate::importer::import_traits::{LevelImporter, PostHandler, TabularSource, TreeMiddleware};
use crate::importer::materializer::Materializer;
use crate::importer::progress::{ImportReport, ProgressReporter, ProgressStatus};
use crate::importer::recorder::UnexpectedRecorder;
use crate::importer::tree_builder::TreeBuilder;
use crate::importer::worker_pool::WorkerPool;
use crate::perf::PerfGuard;
use crate::repository::ImportStore;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

type SharedTreeMiddlewares<R> = Arc<Mutex<Vec<Box<dyn TreeMiddleware<R>>>>>;

// ==========================================
// TreeRuntime - 节点导入共享组件
// ==========================================
struct TreeRuntime<R: Record> {
    store: Arc<dyn ImportStore>,
    middlewares: SharedTreeMiddlewares<R>,
    progress: Arc<ProgressReporter>,
    recorder: Arc<UnexpectedRecorder>,
}

impl<R: Record> TreeRuntime<R> {
    /// 导入一个节点并提交进度；未注册导入器的层跳过
    async fn import_node(
        &self,
        importer: Option<Arc<dyn LevelImporter<R>>>,
        node: &mut TreeNode<R>,
        parent_id: Option<i64>,
    ) -> ImportResult<()> {
        let Some(importer) = importer else {
            debug!(rank = node.rank(), key = node.key(), "该层未注册导入器，跳过");
            self.progress.commit(ProgressStatus::Skipped);
            return Ok(());
        };

        match self.import_unit(importer.as_ref(), node, parent_id).await {
            Ok(()) => {
                self.progress.commit(ProgressStatus::Success);
                Ok(())
            }
            Err(e) => {
                let lines = node.lines();
                error!(rank = node.rank(), key = node.key(), error = %e, "节点导入失败");
                self.recorder.record_import_failure(lines.clone(), e.to_string());
                self.progress.commit(ProgressStatus::Failed);
                Err(ImportError::unit(lines, e))
            }
        }
    }

    async fn import_unit(
        &self,
        importer: &dyn LevelImporter<R>,
        node: &mut TreeNode<R>,
        parent_id: Option<i64>,
    ) -> ImportResult<()> {
        importer
            .import_node(self.store.as_ref(), node, parent_id)
            .await?;

        let mut middlewares = self.middlewares.lock().await;
        for m in middlewares.iter_mut() {
            m.post_node_import(self.store.as_ref(), node).await?;
        }
        Ok(())
    }
}

// ==========================================
// TreeImporter - 树形导入流水线
// ==========================================
pub struct TreeImporter<R: Record> {
    store: Arc<dyn ImportStore>,
    control: TreeControl,
    resolver: Arc<dyn ColumnMappingResolver>,
    root_importer: Option<Arc<dyn LevelImporter<R>>>,
    /// 第 r 层（1 起）的导入器为 level_importers[r-1]
    level_importers: Vec<Option<Arc<dyn LevelImporter<R>>>>,
    post_handlers: Vec<Arc<dyn PostHandler>>,
    middlewares: SharedTreeMiddlewares<R>,
    correctness: Vec<Box<dyn CorrectnessChecker>>,
    progress: Arc<ProgressReporter>,
    recorder: Arc<UnexpectedRecorder>,
    run_id: String,
}

impl<R: Record> TreeImporter<R> {
    /// 创建流水线（各层导入器另行注册）
    pub fn new(store: Arc<dyn ImportStore>, control: TreeControl) -> ImportResult<Self> {
        control.tree.validate()?;
        control.import.settings.validate()?;

        let run_id = Uuid::new_v4().to_string();
        let recorder = Arc::new(UnexpectedRecorder::new(
            run_id.clone(),
            control.import.settings.failure_dir.clone(),
        ));
        let levels = control.tree.level_order.len();

        Ok(Self {
            store,
            control,
            resolver: Arc::new(DeclaredColumnResolver),
            root_importer: None,
            level_importers: vec![None; levels],
            post_handlers: Vec::new(),
            middlewares: Arc::new(Mutex::new(Vec::new())),
            correctness: Vec::new(),
            progress: Arc::new(ProgressReporter::new("tree_import")),
            recorder,
            run_id,
        })
    }

    /// 严格层序流水线: 层序为 0..=boundary，根节点与每一层共用一个导入器
    pub fn strict_order(
        store: Arc<dyn ImportStore>,
        mut control: TreeControl,
        importer: impl LevelImporter<R> + 'static,
    ) -> ImportResult<Self> {
        let boundary = control.tree.tree_boundary;
        control.tree.level_order = (0..=boundary).collect();

        let importer: Arc<dyn LevelImporter<R>> = Arc::new(importer);
        let mut this = Self::new(store, control)?;
        this.root_importer = Some(Arc::clone(&importer));
        for slot in this.level_importers.iter_mut() {
            *slot = Some(Arc::clone(&importer));
        }
        Ok(this)
    }

    pub fn with_resolver(mut self, resolver: impl ColumnMappingResolver + 'static) -> Self {
        self.resolver = Arc::new(resolver);
        self
    }

    pub fn with_root_importer(mut self, importer: impl LevelImporter<R> + 'static) -> Self {
        self.root_importer = Some(Arc::new(importer));
        self
    }

    /// 注册第 rank 层（1 起）的导入器；超出层数的注册被忽略
    pub fn with_level_importer(
        mut self,
        rank: usize,
        importer: impl LevelImporter<R> + 'static,
    ) -> Self {
        match rank.checked_sub(1).and_then(|i| self.level_importers.get_mut(i)) {
            Some(slot) => *slot = Some(Arc::new(importer)),
            None => warn!(rank, levels = self.level_importers.len(), "层级超出层序范围，忽略导入器"),
        }
        self
    }

    pub fn with_post_handler(mut self, handler: impl PostHandler + 'static) -> Self {
        self.post_handlers.push(Arc::new(handler));
        self
    }

    pub fn with_middleware(mut self, middleware: impl TreeMiddleware<R> + 'static) -> Self {
        // 构建期中间件列表尚未共享
        if let Some(list) = Arc::get_mut(&mut self.middlewares) {
            list.get_mut().push(Box::new(middleware));
        }
        self
    }

    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = Arc::new(progress);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn progress(&self) -> &ProgressReporter {
        &self.progress
    }

    pub fn recorder(&self) -> &UnexpectedRecorder {
        &self.recorder
    }

    // ==========================================
    // 建树
    // ==========================================

    fn preprocess(&self, matrix: CellMatrix, mapped_columns: usize) -> Vec<SourceRow> {
        let columns = mapped_columns.max(self.control.tree.column_count);
        self.control.import.preprocessor(columns).run(matrix)
    }

    fn format_check(&self, rows: &[SourceRow], mapping: &ColumnMapping) -> ImportResult<()> {
        if !self.control.import.settings.enable_format_check || mapping.is_empty() {
            return Ok(());
        }

        let mut failed_rows = 0usize;
        for row in rows {
            let violations = format_checker::check_row(mapping, &row.cells);
            if !violations.is_empty() {
                failed_rows += 1;
                self.recorder
                    .record_check_failure(row.line(), format_checker::describe(&violations));
            }
        }
        if failed_rows > 0 {
            warn!(run_id = %self.run_id, failed_rows, "内容检查未通过");
            return Err(ImportError::ContentCheckFailed { failed_rows });
        }
        Ok(())
    }

    /// 预处理并建树，叶子节点挂载物化记录
    pub fn construct(&self, matrix: CellMatrix) -> ImportResult<Tree<R>> {
        let mapping = Arc::new(self.resolver.resolve(&R::shape()));
        let materializer =
            Materializer::<R>::new(Arc::clone(&mapping), self.control.import.settings.strict_types)?;
        let rows = self.preprocess(matrix, mapping.min_column_count());
        self.format_check(&rows, &mapping)?;

        let builder = TreeBuilder::new(
            self.control.tree.level_order.clone(),
            self.control.resolved_key_fn(),
            self.control.resolved_column_end(),
        );
        let tree = builder.build(&rows, &materializer)?;

        info!(
            run_id = %self.run_id,
            rows = rows.len(),
            nodes = tree.node_count(),
            leaves = tree.leaf_count(),
            "建树完成"
        );
        Ok(tree)
    }

    // ==========================================
    // 逐层导入
    // ==========================================

    fn runtime(&self) -> TreeRuntime<R> {
        TreeRuntime {
            store: Arc::clone(&self.store),
            middlewares: Arc::clone(&self.middlewares),
            progress: Arc::clone(&self.progress),
            recorder: Arc::clone(&self.recorder),
        }
    }

    fn importer_for(&self, rank: usize) -> Option<Arc<dyn LevelImporter<R>>> {
        if rank == 0 {
            return self.root_importer.clone();
        }
        self.level_importers.get(rank - 1).cloned().flatten()
    }

    fn parent_id(tree: &Tree<R>, node: NodeId) -> Option<i64> {
        tree.node(node)
            .and_then(|n| n.parent())
            .and_then(|p| tree.node(p))
            .and_then(|p| p.assigned_id())
    }

    /// 导入整棵树: 根节点 → 第 1 层 → ... → 最深层
    pub async fn import_tree(&self, tree: &mut Tree<R>) -> ImportResult<()> {
        {
            let mut middlewares = self.middlewares.lock().await;
            for m in middlewares.iter_mut() {
                m.pre_import(self.store.as_ref(), tree).await?;
            }
        }

        self.progress.start(tree.node_count());
        let mut perf = PerfGuard::new("tree_import");
        perf.set_units(tree.node_count());
        let runtime = Arc::new(self.runtime());

        let result = self.import_ranks(&runtime, tree).await;
        let state = self.progress.finish();
        result?;

        info!(
            run_id = %self.run_id,
            succeeded = state.succeeded,
            skipped = state.skipped,
            "树导入完成"
        );
        Ok(())
    }

    async fn import_ranks(
        &self,
        runtime: &Arc<TreeRuntime<R>>,
        tree: &mut Tree<R>,
    ) -> ImportResult<()> {
        let mut root = tree.take_node(ROOT);
        let result = runtime
            .import_node(self.importer_for(0), &mut root, None)
            .await;
        tree.put_node(root);
        result?;

        let parallel = self.control.tree.parallel_nodes
            && self.control.import.settings.effective_parallelism() > 1;
        let mut nodes = tree.root().children().to_vec();
        let mut rank = 1;

        while !nodes.is_empty() {
            debug!(rank, nodes = nodes.len(), parallel, "导入层级");
            let importer = self.importer_for(rank);
            if parallel {
                self.import_rank_parallel(runtime, tree, &nodes, importer).await?;
            } else {
                for &id in &nodes {
                    let parent_id = Self::parent_id(tree, id);
                    let mut node = tree.take_node(id);
                    let result = runtime
                        .import_node(importer.clone(), &mut node, parent_id)
                        .await;
                    tree.put_node(node);
                    result?;
                }
            }

            nodes = nodes
                .iter()
                .filter_map(|id| tree.node(*id))
                .flat_map(|n| n.children().iter().copied())
                .collect();
            rank += 1;
        }
        Ok(())
    }

    async fn import_rank_parallel(
        &self,
        runtime: &Arc<TreeRuntime<R>>,
        tree: &mut Tree<R>,
        nodes: &[NodeId],
        importer: Option<Arc<dyn LevelImporter<R>>>,
    ) -> ImportResult<()> {
        let units: Vec<(TreeNode<R>, Option<i64>)> = nodes
            .iter()
            .map(|&id| {
                let parent_id = Self::parent_id(tree, id);
                (tree.take_node(id), parent_id)
            })
            .collect();

        let pool = WorkerPool::new(self.control.import.settings.effective_parallelism());
        let outcome = pool
            .run(units, |(mut node, parent_id)| {
                let rt = Arc::clone(runtime);
                let importer = importer.clone();
                async move {
                    let result = rt.import_node(importer, &mut node, parent_id).await;
                    ((node, parent_id), result)
                }
            })
            .await;

        let (units, first_error) = outcome.into_units();
        for (node, _) in units {
            tree.put_node(node);
        }
        first_error.map_or(Ok(()), Err)
    }

    // ==========================================
    // 收尾与正确性校验
    // ==========================================

    /// 收尾: 中间件 → 收尾处理器 → 失败明细落盘
    pub async fn post_handle(&self) -> ImportResult<()> {
        {
            let mut middlewares = self.middlewares.lock().await;
            for m in middlewares.iter_mut() {
                m.post_handle(self.store.as_ref()).await?;
            }
        }
        for handler in &self.post_handlers {
            handler.post_handle(self.store.as_ref()).await?;
        }
        self.recorder.flush()
    }

    /// 启用正确性校验并立即采集基线（须在导入前调用）
    pub async fn enable_correctness_check(
        &mut self,
        checkers: Vec<Box<dyn CorrectnessChecker>>,
    ) -> ImportResult<()> {
        for mut checker in checkers {
            checker.pre_collect(self.store.as_ref()).await?;
            debug!(checker = checker.name(), "基线采集完成");
            self.correctness.push(checker);
        }
        Ok(())
    }

    pub async fn check_correct(&self) -> ImportResult<()> {
        for checker in &self.correctness {
            checker.check_correct(self.store.as_ref()).await?;
            debug!(checker = checker.name(), "正确性校验通过");
        }
        Ok(())
    }

    // ==========================================
    // 一次性执行
    // ==========================================

    /// 建树 → 导入 → 收尾 → 正确性校验；返回导入后的树（含写回的主键）
    #[instrument(skip_all, fields(run_id = %self.run_id))]
    pub async fn run(&self, matrix: CellMatrix) -> ImportResult<(Tree<R>, ImportReport)> {
        let result = self.run_stages(matrix).await;
        if result.is_err() {
            if let Err(e) = self.recorder.flush() {
                warn!(error = %e, "失败明细落盘失败");
            }
        }
        result
    }

    async fn run_stages(&self, matrix: CellMatrix) -> ImportResult<(Tree<R>, ImportReport)> {
        let mut tree = self.construct(matrix)?;
        self.import_tree(&mut tree).await?;
        self.post_handle().await?;
        self.check_correct().await?;
        let report = self.report(tree.node_count());
        Ok((tree, report))
    }

    pub async fn run_file(
        &self,
        source: &dyn TabularSource,
        path: &Path,
    ) -> ImportResult<(Tree<R>, ImportReport)> {
        info!(run_id = %self.run_id, path = %path.display(), "开始导入文件");
        let matrix = source.read(path)?;
        self.run(matrix).await
    }

    pub fn report(&self, units: usize) -> ImportReport {
        ImportReport {
            run_id: self.run_id.clone(),
            units,
            progress: self.progress.snapshot(),
            check_failures: self.recorder.check_failures().len(),
            import_failures: self.recorder.import_failures().len(),
        }
    }
}
